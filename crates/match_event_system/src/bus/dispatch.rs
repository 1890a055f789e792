//! Event dispatch
use super::core::ListenerBus;
use super::stats::DispatchReport;
use crate::envelope::{Event, ServerEvent};
use crate::error::EventError;
use tracing::{debug, error, warn};

impl<C: Send + 'static> ListenerBus<C> {
    /// Dispatches one event to every handler registered for its kind.
    ///
    /// Handlers are awaited one at a time in `(priority, registration)` order.
    /// Dispatch ends early when a handler cancels the event (that handler is
    /// the last one invoked) or returns a fatal error, which is passed back to
    /// the caller. Non-fatal handler errors are logged, recorded in the
    /// report, and the chain continues.
    pub async fn dispatch(&self, ctx: &mut C, event: &ServerEvent) -> Result<DispatchReport, EventError> {
        let kind = event.kind();
        let mut report = DispatchReport::new(kind);

        let Some(entries) = self.handlers.get(&kind) else {
            debug!("No handlers registered for {}", kind);
            let mut stats = self.stats.write().await;
            stats.events_dispatched += 1;
            stats.events_unhandled += 1;
            return Ok(report);
        };

        debug!("📤 Dispatching {} to {} handlers", kind, entries.len());

        let mut cancelled = false;
        let mut fatal = None;

        for entry in entries {
            let name = entry.handler.handler_name();
            report.invoked += 1;

            match entry.handler.handle(ctx, event, &mut cancelled).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("❌ Handler {} aborted {}: {}", name, kind, e);
                    report.failures.push((name.to_string(), e.to_string()));
                    fatal = Some(e);
                    break;
                }
                Err(e) if e.is_persistence() => {
                    error!("❌ Handler {} lost a durable update on {}: {}", name, kind, e);
                    report.failures.push((name.to_string(), e.to_string()));
                }
                Err(e) => {
                    warn!("⚠️ Handler {} failed on {}: {}", name, kind, e);
                    report.failures.push((name.to_string(), e.to_string()));
                }
            }

            if cancelled {
                debug!("{} cancelled by {}", kind, name);
                report.cancelled = true;
                break;
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.events_dispatched += 1;
            stats.handler_failures += report.failures.len() as u64;
            if report.cancelled {
                stats.events_cancelled += 1;
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Convenience wrapper that dispatches a bare payload.
    pub async fn dispatch_payload<E: Event>(&self, ctx: &mut C, payload: E) -> Result<DispatchReport, EventError> {
        self.dispatch(ctx, &payload.into_server_event()).await
    }
}

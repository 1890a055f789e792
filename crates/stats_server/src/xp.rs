//! XP rewards.
//!
//! Raw reward amounts come from `[xp]`; the session's multiplier is applied
//! once, when the award is made.

use crate::config::XpSettings;

/// Why XP was awarded. The label is shown in-game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XpReason {
    Kill,
    FirstBlood,
    CoreLeak,
    ControlPointCapture,
    DestroyableDestroy,
    FlagCapture,
    WoolCapture,
    Win,
    MatchPlayed,
}

impl XpReason {
    pub fn label(&self) -> &'static str {
        match self {
            XpReason::Kill => "Kill",
            XpReason::FirstBlood => "First blood",
            XpReason::CoreLeak => "Core leak",
            XpReason::ControlPointCapture => "Control point captured",
            XpReason::DestroyableDestroy => "Destroyable destroyed",
            XpReason::FlagCapture => "Flag captured",
            XpReason::WoolCapture => "Wool captured",
            XpReason::Win => "Match won",
            XpReason::MatchPlayed => "Match played",
        }
    }
}

/// Raw reward amounts, before the multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct XpRewards {
    settings: XpSettings,
}

impl XpRewards {
    pub fn new(settings: XpSettings) -> Self {
        Self { settings }
    }

    pub fn raw(&self, reason: XpReason) -> u32 {
        let s = &self.settings;
        match reason {
            XpReason::Kill => s.kill,
            XpReason::FirstBlood => s.first_blood,
            XpReason::CoreLeak => s.core_leak,
            XpReason::ControlPointCapture => s.control_point_capture,
            XpReason::DestroyableDestroy => s.destroyable_destroy,
            XpReason::FlagCapture => s.flag_capture,
            XpReason::WoolCapture => s.wool_capture,
            XpReason::Win => s.win,
            XpReason::MatchPlayed => s.match_played,
        }
    }

    pub fn default_multiplier(&self) -> f32 {
        self.settings.multiplier
    }
}

impl Default for XpRewards {
    fn default() -> Self {
        Self::new(XpSettings::default())
    }
}

/// `floor(raw * multiplier)`; negative or NaN multipliers award nothing.
pub fn multiplied_gain(raw: u32, multiplier: f32) -> u32 {
    let gain = (raw as f64 * multiplier as f64).floor();
    if gain.is_nan() || gain <= 0.0 {
        0
    } else if gain >= u32::MAX as f64 {
        u32::MAX
    } else {
        gain as u32
    }
}

/// The multiplier to report alongside a gain; omitted when it is neutral.
pub fn reported_multiplier(multiplier: f32) -> Option<f32> {
    if (multiplier - 1.0).abs() < f32::EPSILON {
        None
    } else {
        Some(multiplier)
    }
}

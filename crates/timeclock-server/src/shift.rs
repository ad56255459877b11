//! Shift state machine.
//!
//! Per employee: `NoOpenShift --IN--> Open --OUT--> NoOpenShift`. An IN
//! while open yields `already_clocked_in`, an OUT while closed yields
//! `no_open_shift`. Durations are whole minutes; shifts longer than the
//! configured maximum are closed normally and flagged.

use timeclock_core::{ErrorCode, PunchAction, Tunables};

/// Subset of the tunables that govern punch acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftRules {
    pub trust_device_time: bool,
    pub max_clock_skew_secs: i64,
    pub max_backdate_secs: i64,
    pub min_seconds_between_punches: i64,
    pub max_shift_minutes: i64,
}

impl From<&Tunables> for ShiftRules {
    fn from(t: &Tunables) -> Self {
        Self {
            trust_device_time: t.trust_device_time,
            max_clock_skew_secs: t.max_clock_skew_secs,
            max_backdate_secs: t.max_backdate_secs,
            min_seconds_between_punches: t.min_seconds_between_punches,
            max_shift_minutes: t.max_shift_minutes,
        }
    }
}

impl Default for ShiftRules {
    fn default() -> Self {
        Self::from(&Tunables::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenShift {
    pub id: i64,
    pub clock_in_at: i64,
}

/// What is known about an employee when a punch arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmployeeState {
    pub open_shift: Option<OpenShift>,
    /// Effective time of the employee's most recent accepted punch.
    pub last_accepted_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Open {
        at: i64,
    },
    Close {
        shift_id: i64,
        at: i64,
        duration_minutes: i64,
        exceeds_max: bool,
    },
}

impl Transition {
    pub const fn at(&self) -> i64 {
        match self {
            Self::Open { at } | Self::Close { at, .. } => *at,
        }
    }
}

impl ShiftRules {
    /// The timestamp a punch is recorded at.
    ///
    /// The device clock is used only when trusted, within
    /// `[received - max_backdate, received + max_skew]`, and not before
    /// `floor`. Anything else falls back to the server receive time.
    pub fn effective_time(&self, device_time: Option<i64>, received_at: i64, floor: Option<i64>) -> i64 {
        match device_time {
            Some(t)
                if self.trust_device_time
                    && t <= received_at.saturating_add(self.max_clock_skew_secs)
                    && t >= received_at.saturating_sub(self.max_backdate_secs)
                    && floor.is_none_or(|f| t >= f) =>
            {
                t
            }
            _ => received_at,
        }
    }

    /// Decide the transition for a punch, or the domain code rejecting it.
    pub fn decide(
        &self,
        state: &EmployeeState,
        action: PunchAction,
        device_time: Option<i64>,
        received_at: i64,
    ) -> Result<Transition, ErrorCode> {
        match (action, state.open_shift) {
            (PunchAction::In, Some(_)) => return Err(ErrorCode::AlreadyClockedIn),
            (PunchAction::Out, None) => return Err(ErrorCode::NoOpenShift),
            _ => {}
        }

        let floor = state
            .open_shift
            .map(|s| s.clock_in_at)
            .max(state.last_accepted_at);
        let at = self.effective_time(device_time, received_at, floor);

        if let Some(last) = state.last_accepted_at {
            if at - last < self.min_seconds_between_punches {
                return Err(ErrorCode::PunchTooSoon);
            }
        }

        Ok(match state.open_shift {
            None => Transition::Open { at },
            Some(shift) => {
                let duration_minutes = (at - shift.clock_in_at).max(0) / 60;
                Transition::Close {
                    shift_id: shift.id,
                    at,
                    duration_minutes,
                    exceeds_max: duration_minutes > self.max_shift_minutes,
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn open_at(clock_in_at: i64) -> EmployeeState {
        EmployeeState {
            open_shift: Some(OpenShift { id: 7, clock_in_at }),
            last_accepted_at: Some(clock_in_at),
        }
    }

    #[test]
    fn in_opens_and_out_closes() {
        let rules = ShiftRules::default();
        let t = rules
            .decide(&EmployeeState::default(), PunchAction::In, None, NOW)
            .unwrap();
        assert_eq!(t, Transition::Open { at: NOW });

        let t = rules
            .decide(&open_at(NOW), PunchAction::Out, None, NOW + 8 * 3600)
            .unwrap();
        assert_eq!(
            t,
            Transition::Close {
                shift_id: 7,
                at: NOW + 8 * 3600,
                duration_minutes: 480,
                exceeds_max: false,
            }
        );
    }

    #[test]
    fn wrong_state_is_rejected() {
        let rules = ShiftRules::default();
        assert_eq!(
            rules.decide(&open_at(NOW), PunchAction::In, None, NOW + 600),
            Err(ErrorCode::AlreadyClockedIn)
        );
        assert_eq!(
            rules.decide(&EmployeeState::default(), PunchAction::Out, None, NOW),
            Err(ErrorCode::NoOpenShift)
        );
    }

    #[test]
    fn punch_too_soon_after_last_accepted() {
        let rules = ShiftRules::default();
        assert_eq!(
            rules.decide(&open_at(NOW), PunchAction::Out, None, NOW + 30),
            Err(ErrorCode::PunchTooSoon)
        );
        assert!(rules.decide(&open_at(NOW), PunchAction::Out, None, NOW + 60).is_ok());
    }

    #[test]
    fn long_shift_is_flagged_not_rejected() {
        let rules = ShiftRules::default();
        let out_at = NOW + 17 * 3600;
        let t = rules.decide(&open_at(NOW), PunchAction::Out, None, out_at).unwrap();
        assert!(matches!(t, Transition::Close { exceeds_max: true, duration_minutes: 1020, .. }));
    }

    #[test]
    fn device_time_used_within_window() {
        let rules = ShiftRules::default();
        let backdated = NOW - 3600;
        assert_eq!(rules.effective_time(Some(backdated), NOW, None), backdated);
        assert_eq!(rules.effective_time(Some(NOW + 120), NOW, None), NOW + 120);
    }

    #[test]
    fn device_time_outside_window_falls_back() {
        let rules = ShiftRules::default();
        assert_eq!(rules.effective_time(Some(NOW + 3600), NOW, None), NOW);
        assert_eq!(
            rules.effective_time(Some(NOW - rules.max_backdate_secs - 1), NOW, None),
            NOW
        );
        assert_eq!(rules.effective_time(None, NOW, None), NOW);
    }

    #[test]
    fn untrusted_device_time_is_ignored() {
        let rules = ShiftRules {
            trust_device_time: false,
            ..ShiftRules::default()
        };
        assert_eq!(rules.effective_time(Some(NOW - 60), NOW, None), NOW);
    }

    #[test]
    fn out_before_clock_in_uses_receive_time() {
        let rules = ShiftRules::default();
        let t = rules
            .decide(&open_at(NOW), PunchAction::Out, Some(NOW - 600), NOW + 3600)
            .unwrap();
        assert_eq!(t.at(), NOW + 3600);
    }

    #[test]
    fn offline_shift_keeps_device_times() {
        let rules = ShiftRules::default();
        let received = NOW + 10 * 3600;
        let t = rules
            .decide(&open_at(NOW), PunchAction::Out, Some(NOW + 8 * 3600), received)
            .unwrap();
        assert!(matches!(t, Transition::Close { duration_minutes: 480, .. }));
    }
}

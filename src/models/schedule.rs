//! Schedules: timing and state qualifiers attached to identifiers.
//!
//! An absent schedule (`None`) means "any activation"; an explicitly
//! empty schedule (`Some` with no parameters) means an implicit press.
//! The two are distinct and both representable.

use crate::constants::MAX_ANALOG_VALUE;
use serde::Serialize;
use std::fmt;

/// Unit of a timing parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    /// Parses a unit suffix (`s`, `ms`, `us`, `ns`).
    #[must_use]
    pub fn parse(suffix: &str) -> Option<Self> {
        match suffix {
            "s" => Some(TimeUnit::Seconds),
            "ms" => Some(TimeUnit::Milliseconds),
            "us" => Some(TimeUnit::Microseconds),
            "ns" => Some(TimeUnit::Nanoseconds),
            _ => None,
        }
    }

    /// Canonical suffix for this unit.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "us",
            TimeUnit::Nanoseconds => "ns",
        }
    }
}

/// A timing parameter: amount plus unit (`300ms`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Time {
    pub amount: f64,
    pub unit: TimeUnit,
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Integral amounts print without a decimal point
        if self.amount.fract() == 0.0 {
            write!(f, "{}{}", self.amount as u64, self.unit.suffix())
        } else {
            write!(f, "{}{}", self.amount, self.unit.suffix())
        }
    }
}

/// Activation state a schedule parameter binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScheduleState {
    /// `P` - press
    Press,
    /// `H` - hold
    Hold,
    /// `R` - release
    Release,
    /// `O` - off
    Off,
    /// `UP` - unique press
    UniquePress,
    /// `UR` - unique release
    UniqueRelease,
    /// `D` - depress (indicator/animation off edge)
    Depress,
    /// `A` - activate (indicator on edge)
    Activate,
}

impl ScheduleState {
    /// Parses a state name as written in KLL source.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "P" => Some(ScheduleState::Press),
            "H" => Some(ScheduleState::Hold),
            "R" => Some(ScheduleState::Release),
            "O" => Some(ScheduleState::Off),
            "UP" => Some(ScheduleState::UniquePress),
            "UR" => Some(ScheduleState::UniqueRelease),
            "D" => Some(ScheduleState::Depress),
            "A" => Some(ScheduleState::Activate),
            _ => None,
        }
    }

    /// Canonical KLL spelling.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ScheduleState::Press => "P",
            ScheduleState::Hold => "H",
            ScheduleState::Release => "R",
            ScheduleState::Off => "O",
            ScheduleState::UniquePress => "UP",
            ScheduleState::UniqueRelease => "UR",
            ScheduleState::Depress => "D",
            ScheduleState::Activate => "A",
        }
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One parameter of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "param", rename_all = "snake_case")]
pub enum ScheduleParam {
    /// A state, optionally bound to a timing (`H:300ms`)
    State {
        state: ScheduleState,
        timing: Option<Time>,
    },
    /// A bare timing bound to the implicit default state
    Timing(Time),
    /// A bare analog activation value (`0..=255`)
    Analog { value: u16 },
}

impl fmt::Display for ScheduleParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleParam::State { state, timing } => match timing {
                Some(time) => write!(f, "{state}:{time}"),
                None => write!(f, "{state}"),
            },
            ScheduleParam::Timing(time) => write!(f, "{time}"),
            ScheduleParam::Analog { value } => write!(f, "{value}"),
        }
    }
}

/// An ordered list of schedule parameters attached to an identifier.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Schedule {
    pub params: Vec<ScheduleParam>,
}

impl Schedule {
    /// Creates an empty schedule (implicit press).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the parameter list.
    ///
    /// # Errors
    ///
    /// Returns a description when a state is bound more than once or an
    /// analog value is out of range.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = Vec::new();
        for param in &self.params {
            match param {
                ScheduleParam::State { state, .. } => {
                    if seen.contains(state) {
                        return Err(format!("state '{state}' bound more than once"));
                    }
                    seen.push(*state);
                }
                ScheduleParam::Analog { value } => {
                    if *value > MAX_ANALOG_VALUE {
                        return Err(format!(
                            "analog value {value} exceeds maximum {MAX_ANALOG_VALUE}"
                        ));
                    }
                }
                ScheduleParam::Timing(_) => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

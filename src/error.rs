use std::fmt;

/// ticks before the declared end of a demo where a fatal error is
/// assumed to be caused by a truncated recording
pub const END_OF_DEMO_MARGIN: i32 = 100;

/// a fatal error that stopped the parse of one demo
#[derive(Debug, thiserror::Error)]
#[error("{message} on tick {tick}")]
pub struct ParseFailure {
    pub message: String,
    pub tick: i32,
    /// the failure happened close enough to the end to be harmless
    pub at_end_of_demo: bool,
}

impl ParseFailure {
    pub fn new(err: std::io::Error, tick: i32, total_ticks: i32) -> Self {
        Self {
            message: err.to_string(),
            tick,
            at_end_of_demo: total_ticks > 0 && total_ticks - tick <= END_OF_DEMO_MARGIN,
        }
    }
}

#[inline]
pub(crate) fn invalid_data(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    ByteMismatch,
    PovPlayerNotFound,
    VictimTeamNotFound,
    InvalidStringLength,
    SpecAttackerTeamNotFound,
}

impl WarningKind {
    pub fn text(self) -> &'static str {
        match self {
            WarningKind::ByteMismatch => "read bytes don't match packet data length",
            WarningKind::PovPlayerNotFound => "POV player not found by death event",
            WarningKind::VictimTeamNotFound => "victim team not found on death event",
            WarningKind::InvalidStringLength => "invalid string length while decoding string",
            WarningKind::SpecAttackerTeamNotFound => {
                "spectated attacker team not found on death event"
            }
        }
    }
}

/// a recoverable anomaly, counted once per kind and demo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    /// tick of the first occurrence
    pub tick: i32,
    pub count: u32,
}

#[derive(Debug, Default, Clone)]
pub struct WarningLog {
    entries: Vec<Warning>,
}

impl WarningLog {
    pub fn add(&mut self, kind: WarningKind, tick: i32) {
        if let Some(w) = self.entries.iter_mut().find(|w| w.kind == kind) {
            w.count += 1;
            return;
        }

        self.entries.push(Warning {
            kind,
            tick,
            count: 1,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// one line per warning kind, prefixed by the demo name
    pub fn display<'a>(&'a self, demo_name: &'a str) -> WarningLogDisplay<'a> {
        WarningLogDisplay {
            log: self,
            demo_name,
        }
    }
}

pub struct WarningLogDisplay<'a> {
    log: &'a WarningLog,
    demo_name: &'a str,
}

impl fmt::Display for WarningLogDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for w in self.log.iter() {
            write!(
                f,
                "{}: {} on tick {}",
                self.demo_name,
                w.kind.text(),
                w.tick
            )?;
            if w.count > 1 {
                write!(f, " ({}x)", w.count)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_deduplicated() {
        let mut log = WarningLog::default();
        log.add(WarningKind::ByteMismatch, 120);
        log.add(WarningKind::VictimTeamNotFound, 300);
        log.add(WarningKind::ByteMismatch, 500);

        assert_eq!(log.len(), 2);
        assert_eq!(
            log.display("test.dem").to_string(),
            "test.dem: read bytes don't match packet data length on tick 120 (2x)\n\
             test.dem: victim team not found on death event on tick 300\n"
        );
    }

    #[test]
    fn failure_near_end_is_benign() {
        let err = invalid_data("invalid cmd number");

        let failure = ParseFailure::new(err, 9950, 10000);
        assert!(failure.at_end_of_demo);
        assert_eq!(failure.to_string(), "invalid cmd number on tick 9950");

        let failure = ParseFailure::new(invalid_data("invalid cmd number"), 5000, 10000);
        assert!(!failure.at_end_of_demo);

        let failure = ParseFailure::new(invalid_data("invalid cmd number"), 5000, 0);
        assert!(!failure.at_end_of_demo);
    }
}

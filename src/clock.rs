use crate::error::invalid_data;

/// the demo's notion of time, a tick counter and the interval announced by the server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickClock {
    pub tick: i32,
    /// playback ticks from the header
    pub total_ticks: i32,
    tick_interval: f32,
    tick_rate: i32,
}

impl TickClock {
    pub fn new(total_ticks: i32) -> Self {
        Self {
            tick: 0,
            total_ticks,
            tick_interval: -1.0,
            tick_rate: 0,
        }
    }

    pub fn with_tick_interval(tick_interval: f32) -> Self {
        let mut clock = Self::new(0);
        clock.set_tick_interval(tick_interval);
        clock
    }

    pub fn set_tick_interval(&mut self, tick_interval: f32) {
        self.tick_interval = tick_interval;
        self.tick_rate = if tick_interval > 0.0 {
            (1.0 / tick_interval) as i32
        } else {
            0
        };
    }

    #[inline]
    pub fn tick_interval(&self) -> f32 {
        self.tick_interval
    }

    /// ticks per second, rounded down
    #[inline]
    pub fn tick_rate(&self) -> i32 {
        self.tick_rate
    }

    /// seconds between two ticks, -1 for the same tick
    pub fn time_between_ticks(&self, tick1: i32, tick2: i32) -> Result<f32, std::io::Error> {
        if tick1 == tick2 {
            return Ok(-1.0);
        }

        if self.tick_interval <= 0.0 {
            return Err(invalid_data("invalid tick interval"));
        }

        Ok((tick1 - tick2).unsigned_abs() as f32 * self.tick_interval)
    }

    #[inline]
    pub fn ticks_for_duration(&self, duration_ms: i32) -> i32 {
        crate::player::ticks_for_duration(self.tick_rate, duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_rate_from_interval() {
        assert_eq!(TickClock::with_tick_interval(0.015).tick_rate(), 66);
        assert_eq!(TickClock::with_tick_interval(0.01).tick_rate(), 100);
        assert_eq!(TickClock::new(0).tick_rate(), 0);
    }

    #[test]
    fn time_between() {
        let clock = TickClock::with_tick_interval(0.01);
        assert_eq!(clock.time_between_ticks(50, 50).unwrap(), -1.0);
        assert!((clock.time_between_ticks(100, 300).unwrap() - 2.0).abs() < 1e-5);
        assert!((clock.time_between_ticks(300, 100).unwrap() - 2.0).abs() < 1e-5);

        let unset = TickClock::new(1000);
        assert_eq!(unset.time_between_ticks(7, 7).unwrap(), -1.0);
        assert_eq!(
            unset.time_between_ticks(1, 2).unwrap_err().to_string(),
            "invalid tick interval"
        );
    }

    #[test]
    fn duration_in_ticks_rounds_up() {
        let clock = TickClock::with_tick_interval(1.0 / 66.0);
        assert_eq!(clock.ticks_for_duration(300), 20);
        assert_eq!(clock.ticks_for_duration(0), 0);
    }
}

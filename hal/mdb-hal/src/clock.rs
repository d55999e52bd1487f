//! Monotonic millisecond clock

/// Millisecond tick source
///
/// The counter is free running and may wrap; consumers compare ticks with
/// `wrapping_sub`.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch
    fn now_ms(&self) -> u32;

    /// Milliseconds elapsed since `earlier`
    fn elapsed_since(&self, earlier: u32) -> u32 {
        self.now_ms().wrapping_sub(earlier)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u32);

    impl Clock for Fixed {
        fn now_ms(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_elapsed_wraps() {
        let clock = Fixed(5);
        assert_eq!(clock.elapsed_since(u32::MAX - 4), 10);
    }

    #[test]
    fn test_elapsed_through_reference() {
        let clock = Fixed(1200);
        let by_ref = &clock;
        assert_eq!(by_ref.elapsed_since(1000), 200);
    }
}

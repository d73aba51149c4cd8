use easy_ext::ext;
use std::time::Duration;

pub(crate) mod prelude {
    pub(crate) use super::DurationExt as _;
    pub(crate) use super::ErrorExt as _;
}

#[ext(ErrorExt)]
pub(crate) impl<E> E
where
    E: std::error::Error + ?Sized,
{
    fn display_chain(&self) -> display_error_chain::DisplayErrorChain<&Self> {
        display_error_chain::DisplayErrorChain::new(self)
    }
}

#[ext(DurationExt)]
pub(crate) impl Duration {
    /// Whole seconds, rounded down. Used for human-readable chat replies,
    /// where sub-second precision is just noise.
    fn whole_secs_display(&self) -> String {
        let secs = self.as_secs();
        let (hours, rest) = (secs / 3600, secs % 3600);
        let (minutes, seconds) = (rest / 60, rest % 60);

        if hours > 0 {
            format!("{hours}h {minutes}m {seconds}s")
        } else if minutes > 0 {
            format!("{minutes}m {seconds}s")
        } else {
            format!("{seconds}s")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn whole_secs_display() {
        let display = |secs| Duration::from_secs_f64(secs).whole_secs_display();

        expect!["0s"].assert_eq(&display(0.7));
        expect!["59s"].assert_eq(&display(59.0));
        expect!["2m 5s"].assert_eq(&display(125.9));
        expect!["1h 0m 1s"].assert_eq(&display(3601.0));
    }
}

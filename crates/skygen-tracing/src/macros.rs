//! Shorthand for timed spans and tagged events.

/// A [`TimedSpan`](crate::performance::TimedSpan), optionally inside a
/// debug span carrying extra fields. The field span stays entered until the
/// timer is dropped.
///
/// ```rust
/// use skygen_tracing::perf_span;
///
/// let _timer = perf_span!("draw_launch", lanes = 1152u64);
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {
        $crate::performance::TimedSpan::new($name)
    };
    ($name:expr, $($field:ident = $value:expr),+ $(,)?) => {{
        let fields = tracing::debug_span!("perf_fields", $($field = $value),+).entered();
        $crate::performance::TimedSpan::new($name).within(fields)
    }};
}

/// Debug event tagged with `event = $name`.
///
/// ```rust
/// use skygen_tracing::perf_event;
///
/// perf_event!("sink_drained", stars = 1024, launch = 3);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:ident = $value:expr),+ $(,)?) => {
        tracing::debug!(event = $name, $($field = $value),+)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn perf_span_with_fields() {
        let timer = perf_span!("macro_span", lanes = 4u64, bytes = 16usize);
        assert!(timer.elapsed_us() < 60_000_000);
        let _plain = perf_span!("plain");
    }

    #[test]
    fn perf_span_fields_cover_the_timed_region() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let timer = perf_span!("covered", lanes = 8u64);
            let current = tracing::Span::current();
            assert_eq!(current.metadata().map(|m| m.name()), Some("perf_fields"));
            drop(timer);
            assert!(tracing::Span::current().is_none());
        });
    }

    #[test]
    fn perf_event_with_trailing_comma() {
        perf_event!("macro_event", count = 1, label = "x",);
    }
}

/// Builds dotted metric names: `{prefix}.{instance}.{suffix}`.
///
/// Empty segments are skipped, so an absent (or empty) instance name yields
/// `{prefix}.{suffix}`. Two namers built from the same prefix and instance
/// produce byte-identical ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricNamer {
    base: String,
}

impl MetricNamer {
    pub fn new(prefix: &str, instance: Option<&str>) -> Self {
        Self {
            base: join([Some(prefix), instance]),
        }
    }

    /// Full id of the metric with this suffix.
    pub fn id(&self, suffix: &str) -> String {
        join([Some(self.base.as_str()), Some(suffix)])
    }

    /// `{prefix}.{instance}` part shared by every id.
    pub fn base(&self) -> &str {
        &self.base
    }
}

fn join<'a>(segments: impl IntoIterator<Item = Option<&'a str>>) -> String {
    let mut out = String::new();
    for seg in segments.into_iter().flatten() {
        if seg.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('.');
        }
        out.push_str(seg);
    }
    out
}

use chrono::DateTime;
use prometheus::core::Collector;
use prometheus::{GaugeVec, Opts};

const APP_NAME: &str = "http-connection-probe";

/// Build metadata, exposed as two constant gauges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub revision: String,
    pub branch: String,
    /// RFC 3339 timestamp, or empty when unknown.
    pub build_time: String,
}

impl BuildInfo {
    /// Metadata baked in by `build.rs`.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            revision: env!("PROBE_GIT_REVISION").to_string(),
            branch: env!("PROBE_GIT_BRANCH").to_string(),
            build_time: env!("PROBE_BUILD_TIME").to_string(),
        }
    }

    /// Build time in unix seconds; 0 if missing or unparsable.
    pub fn build_time_unix(&self) -> i64 {
        DateTime::parse_from_rfc3339(self.build_time.trim())
            .map(|time| time.timestamp())
            .unwrap_or(0)
    }

    pub(super) fn collectors(
        &self,
        namespace: &str,
    ) -> Result<Vec<Box<dyn Collector>>, prometheus::Error> {
        let build_time = self.build_time_unix();
        let build_time_label = build_time.to_string();

        let info = GaugeVec::new(
            Opts::new("build_info", "Build info").namespace(namespace),
            &["app", "version", "revision", "branch", "buildtime"],
        )?;
        info.with_label_values(&[
            APP_NAME,
            &self.version,
            &self.revision,
            &self.branch,
            &build_time_label,
        ])
        .set(1.0);

        let time = GaugeVec::new(
            Opts::new("build_time", "Build time").namespace(namespace),
            &["app", "version", "revision", "branch"],
        )?;
        time.with_label_values(&[APP_NAME, &self.version, &self.revision, &self.branch])
            .set(build_time as f64);

        Ok(vec![Box::new(info), Box::new(time)])
    }
}

//! Declarative service unit specification and its canonical rendering.
//!
//! A `UnitSpec` captures everything the service backend needs to materialize
//! a runnable OS service. The rendered text doubles as the canonical form for
//! change detection: `fingerprint()` hashes every field that affects runtime
//! behavior, so two specs with the same fingerprint are interchangeable as
//! far as the running process is concerned.

/// Declarative specification for one OS service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitSpec {
    /// Human-readable description. Cosmetic: never part of the fingerprint.
    pub description: String,
    pub service_user: String,
    pub service_group: String,
    pub service_type: String,
    pub exec_start: String,
    pub restart: Option<String>,
    pub restart_sec: Option<u32>,
    pub timeout_start_sec: Option<u64>,
    pub timeout_abort_sec: Option<u64>,
    pub watchdog_sec: Option<u64>,
    pub watchdog_signal: Option<String>,
    pub runtime_directory: Option<String>,
    pub private_tmp: Option<bool>,
    /// `KEY=value` assignments, rendered as a single `Environment=` line.
    pub environment: Vec<String>,
    pub wanted_by: Option<String>,
}

impl UnitSpec {
    /// Render the spec as systemd unit-file text.
    ///
    /// Optional fields are omitted entirely when unset; the `[Install]`
    /// section only appears when `wanted_by` is set.
    pub fn render(&self) -> String {
        let mut out = format!(
            "[Unit]\nDescription={}\n\n[Service]\n{}",
            self.description,
            self.service_lines().join("\n")
        );
        if let Some(ref wanted_by) = self.wanted_by {
            out.push_str(&format!("\n\n[Install]\nWantedBy={wanted_by}"));
        }
        out
    }

    /// Hash of every behavior-affecting field.
    ///
    /// Description changes never alter the fingerprint, so cosmetic edits
    /// never force a service recreation.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for line in self.service_lines() {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        if let Some(ref wanted_by) = self.wanted_by {
            hasher.update(wanted_by.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    fn service_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("User={}", self.service_user),
            format!("Group={}", self.service_group),
            format!("Type={}", self.service_type),
            format!("ExecStart={}", self.exec_start),
        ];
        if let Some(ref restart) = self.restart {
            lines.push(format!("Restart={restart}"));
        }
        if let Some(sec) = self.restart_sec {
            lines.push(format!("RestartSec={sec}"));
        }
        if let Some(sec) = self.timeout_start_sec {
            lines.push(format!("TimeoutStartSec={sec}"));
        }
        if let Some(sec) = self.timeout_abort_sec {
            lines.push(format!("TimeoutAbortSec={sec}"));
        }
        if let Some(sec) = self.watchdog_sec {
            lines.push(format!("WatchdogSec={sec}"));
        }
        if let Some(ref signal) = self.watchdog_signal {
            lines.push(format!("WatchdogSignal={signal}"));
        }
        if let Some(ref dir) = self.runtime_directory {
            lines.push(format!("RuntimeDirectory={dir}"));
        }
        if let Some(private_tmp) = self.private_tmp {
            lines.push(format!(
                "PrivateTmp={}",
                if private_tmp { "yes" } else { "no" }
            ));
        }
        if !self.environment.is_empty() {
            lines.push(format!("Environment={}", self.environment.join(" ")));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_spec() -> UnitSpec {
        UnitSpec {
            description: "Test Service".to_string(),
            service_user: "importer".to_string(),
            service_group: "importer".to_string(),
            service_type: "simple".to_string(),
            exec_start: "/usr/local/bin/pkg-importer broker tcp://*:1692".to_string(),
            restart: Some("always".to_string()),
            restart_sec: Some(5),
            timeout_start_sec: Some(60),
            timeout_abort_sec: None,
            watchdog_sec: Some(259200),
            watchdog_signal: None,
            runtime_directory: Some("longshore".to_string()),
            private_tmp: Some(true),
            environment: vec!["PYTHONUNBUFFERED=1".to_string()],
            wanted_by: Some("multi-user.target".to_string()),
        }
    }

    #[test]
    fn test_render_with_all_optional_fields() {
        let expected = "[Unit]\n\
                        Description=Test Service\n\
                        \n\
                        [Service]\n\
                        User=importer\n\
                        Group=importer\n\
                        Type=simple\n\
                        ExecStart=/usr/local/bin/pkg-importer broker tcp://*:1692\n\
                        Restart=always\n\
                        RestartSec=5\n\
                        TimeoutStartSec=60\n\
                        WatchdogSec=259200\n\
                        RuntimeDirectory=longshore\n\
                        PrivateTmp=yes\n\
                        Environment=PYTHONUNBUFFERED=1\n\
                        \n\
                        [Install]\n\
                        WantedBy=multi-user.target";

        assert_eq!(full_spec().render(), expected);
    }

    #[test]
    fn test_render_without_install_section() {
        let mut spec = full_spec();
        spec.wanted_by = None;
        let rendered = spec.render();
        assert!(!rendered.contains("[Install]"));
        assert!(rendered.ends_with("Environment=PYTHONUNBUFFERED=1"));
    }

    #[test]
    fn test_render_omits_unset_fields() {
        let spec = UnitSpec {
            description: "Minimal".to_string(),
            service_user: "importer".to_string(),
            service_group: "importer".to_string(),
            service_type: "simple".to_string(),
            exec_start: "/usr/bin/true".to_string(),
            ..UnitSpec::default()
        };
        let rendered = spec.render();
        assert!(!rendered.contains("Restart="));
        assert!(!rendered.contains("PrivateTmp"));
        assert!(!rendered.contains("Environment="));
        assert!(!rendered.contains("WatchdogSec"));
    }

    #[test]
    fn test_render_private_tmp_no() {
        let mut spec = full_spec();
        spec.private_tmp = Some(false);
        assert!(spec.render().contains("PrivateTmp=no"));
    }

    #[test]
    fn test_render_joins_environment_on_one_line() {
        let mut spec = full_spec();
        spec.environment = vec!["VAR1=value1".to_string(), "VAR2=value2".to_string()];
        assert!(spec.render().contains("Environment=VAR1=value1 VAR2=value2"));
    }

    #[test]
    fn test_fingerprint_ignores_description() {
        let a = full_spec();
        let mut b = full_spec();
        b.description = "Completely different text".to_string();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_exec_start() {
        let a = full_spec();
        let mut b = full_spec();
        b.exec_start = "/usr/local/bin/pkg-importer broker tcp://*:1700".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_environment() {
        let a = full_spec();
        let mut b = full_spec();
        b.environment.push("https_proxy=http://proxy:3128".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}

use std::path::PathBuf;
use std::time::Duration;

use super::template::{self, Vars};
use crate::config::HandlerConfig;
use crate::delivery::{Alert, Delivery};
use crate::event::ChangeKind;

/// Where an alert takes its icon from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSpec {
    None,
    /// `ico_<event>.ico` in the icon directory
    Auto,
    Path(PathBuf),
}

impl IconSpec {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "" => IconSpec::None,
            v if v.eq_ignore_ascii_case("auto") => IconSpec::Auto,
            v => IconSpec::Path(PathBuf::from(v)),
        }
    }
}

/// Desktop alert channel settings.
#[derive(Debug, Clone)]
pub struct AlertChannel {
    ticker: String,
    icon: IconSpec,
    icon_dir: PathBuf,
    timeout: Duration,
}

impl AlertChannel {
    pub(super) fn from_config(config: &HandlerConfig, icon_dir: &std::path::Path) -> Self {
        Self {
            ticker: config.ticker.clone(),
            icon: IconSpec::parse(&config.icon),
            icon_dir: icon_dir.to_path_buf(),
            timeout: Duration::from_secs(config.timeout),
        }
    }

    pub fn icon(&self) -> &IconSpec {
        &self.icon
    }

    /// Icon file for an alert, if it exists. A missing file means no icon.
    pub fn resolve_icon(&self, kind: Option<ChangeKind>) -> Option<PathBuf> {
        let candidate = match (&self.icon, kind) {
            (IconSpec::Auto, Some(kind)) => {
                self.icon_dir.join(format!("ico_{}.ico", kind.mnemonic()))
            }
            (IconSpec::Path(path), _) => path.clone(),
            _ => return None,
        };
        candidate.is_file().then_some(candidate)
    }

    pub(super) fn delivery(
        &self,
        vars: &Vars<'_>,
        title: String,
        body: String,
        kind: Option<ChangeKind>,
    ) -> Delivery {
        Delivery::Alert(Alert {
            title,
            body,
            ticker: template::render(&self.ticker, vars),
            icon: self.resolve_icon(kind),
            timeout: self.timeout,
        })
    }
}

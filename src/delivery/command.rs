//! Desktop alerts through an external notifier command.

use std::process::Command;

use super::{Alert, AlertSink, DeliveryError};

/// Raises alerts by running a `notify-send` compatible program:
/// `<program> -a <ticker> -t <millis> [-i <icon>] <title> <body>`.
#[derive(Debug, Clone)]
pub struct CommandAlertSink {
    program: String,
}

impl CommandAlertSink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, alert: &Alert) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-a")
            .arg(&alert.ticker)
            .arg("-t")
            .arg(alert.timeout.as_millis().to_string());
        if let Some(icon) = &alert.icon {
            cmd.arg("-i").arg(icon);
        }
        cmd.arg(&alert.title).arg(&alert.body);
        cmd
    }
}

impl AlertSink for CommandAlertSink {
    fn notify(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let output = self
            .command(alert)
            .output()
            .map_err(|e| DeliveryError::Command {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::Command {
                program: self.program.clone(),
                reason: format!("{} {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn alert(icon: Option<PathBuf>) -> Alert {
        Alert {
            title: "WATCHER NOTIFICATION - /data".into(),
            body: "CREATED FILE a.txt".into(),
            ticker: "changewatch".into(),
            icon,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_arguments_without_icon() {
        let sink = CommandAlertSink::new("notify-send");
        let cmd = sink.command(&alert(None));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-a",
                "changewatch",
                "-t",
                "5000",
                "WATCHER NOTIFICATION - /data",
                "CREATED FILE a.txt"
            ]
        );
    }

    #[test]
    fn test_icon_is_passed() {
        let sink = CommandAlertSink::new("notify-send");
        let cmd = sink.command(&alert(Some(PathBuf::from("img/ico_cre.ico"))));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.windows(2).any(|w| w == ["-i", "img/ico_cre.ico"]));
    }

    #[test]
    fn test_missing_program_is_a_delivery_error() {
        let sink = CommandAlertSink::new("changewatch-no-such-notifier");
        let err = sink.notify(&alert(None)).unwrap_err();
        assert!(matches!(err, DeliveryError::Command { .. }));
    }
}

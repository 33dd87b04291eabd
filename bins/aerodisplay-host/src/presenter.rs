use aerodisplay_node::{DisplayView, Presenter};
use tracing::{info, warn};

/// Presenter that logs the screen contents whenever they change.
#[derive(Debug, Default)]
pub struct LogPresenter {
    last: Option<String>,
    last_error: Option<String>,
}

impl LogPresenter {
    fn summarize(view: &DisplayView) -> String {
        let lines: Vec<String> = view.sensor_lines().iter().map(ToString::to_string).collect();
        let upstream = if view.status.upstream_connected {
            "UART OK"
        } else {
            "UART --"
        };
        let mut summary = format!(
            "[{}] {} | {} | WiFi {} | {}",
            view.theme.name(),
            view.profile.display_name,
            upstream,
            view.network,
            lines.join(", ")
        );
        if view.data_stale() {
            summary.push_str(" | DATA STALE");
        }
        summary
    }
}

impl Presenter for LogPresenter {
    fn render(&mut self, view: &DisplayView) {
        if view.status.last_error != self.last_error {
            if let Some(error) = &view.status.last_error {
                warn!("Controller error: {}", error);
            }
            self.last_error = view.status.last_error.clone();
        }

        let summary = Self::summarize(view);
        if self.last.as_deref() != Some(summary.as_str()) {
            info!("{}", summary);
            self.last = Some(summary);
        }
    }
}

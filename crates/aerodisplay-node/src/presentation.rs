//! Seam between the coordination core and whatever draws the screen.
//!
//! A [`Presenter`] receives a [`DisplayView`] every refresh and never touches
//! shared state directly. Operator input comes back as an [`OperatorIntent`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use aerodisplay_core::{
    ConfigError, ConfigStore, DeviceProfile, DeviceState, Millis, SensorFrame, SystemStatus,
    ThemeColor,
};

use crate::link::{CommandError, LinkHandle};
use crate::network::{NetworkState, NetworkStatusHandle};
use crate::runtime::NodeClock;

/// Presentation refresh period.
pub const PRESENTATION_TICK: Duration = Duration::from_millis(50);

/// Shown in place of a value that must not be presented as real.
pub const PLACEHOLDER: &str = "--";

/// Renders a view of the node.
pub trait Presenter: Send {
    fn render(&mut self, view: &DisplayView);
}

/// Everything a presenter needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayView {
    pub profile: &'static DeviceProfile,
    pub sensors: SensorFrame,
    pub status: SystemStatus,
    pub network: NetworkState,
    pub theme: ThemeColor,
    pub now: Millis,
}

/// One labelled sensor value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorLine {
    pub name: &'static str,
    pub unit: &'static str,
    /// `None` when the slot is invalid or the frame is stale.
    pub value: Option<f32>,
}

impl fmt::Display for SensorLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{}: {:.1} {}", self.name, v, self.unit),
            None => write!(f, "{}: {} {}", self.name, PLACEHOLDER, self.unit),
        }
    }
}

impl DisplayView {
    pub fn sensor_lines(&self) -> Vec<SensorLine> {
        let stale = self.data_stale();
        self.profile
            .sensors
            .iter()
            .enumerate()
            .map(|(i, sensor)| SensorLine {
                name: sensor.name,
                unit: sensor.unit,
                value: if stale { None } else { self.sensors.reading(i) },
            })
            .collect()
    }

    /// True once readings have arrived and then gone quiet.
    pub fn data_stale(&self) -> bool {
        self.sensors.is_stale(self.now)
    }
}

/// Snapshot source for presenters.
#[derive(Debug, Clone)]
pub struct ViewSource {
    pub profile: &'static DeviceProfile,
    pub state: Arc<DeviceState>,
    pub store: Arc<ConfigStore>,
    pub network: NetworkStatusHandle,
}

impl ViewSource {
    pub fn view(&self, now: Millis) -> DisplayView {
        DisplayView {
            profile: self.profile,
            sensors: self.state.read_sensors(),
            status: self.state.read_status(),
            network: self.network.state(),
            theme: self.store.theme_color(),
            now,
        }
    }
}

/// Refresh the presenter forever at [`PRESENTATION_TICK`].
pub async fn run_presentation<P: Presenter>(mut presenter: P, source: ViewSource, clock: NodeClock) {
    info!("Presentation worker started");
    let mut interval = tokio::time::interval(PRESENTATION_TICK);
    loop {
        interval.tick().await;
        presenter.render(&source.view(clock.now()));
    }
}

// ============================================================================
// Operator Intents
// ============================================================================

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("Unrecognized input: {0}")]
    Parse(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Something the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorIntent {
    Manual { action: String, arg: Option<i32> },
    ToggleTheme,
}

impl FromStr for OperatorIntent {
    type Err = IntentError;

    /// Parses `theme`, `<action>` or `<action> <n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let action = words
            .next()
            .ok_or_else(|| IntentError::Parse(s.to_string()))?
            .to_ascii_lowercase();

        let arg = match words.next() {
            Some(word) => Some(
                word.parse::<i32>()
                    .map_err(|_| IntentError::Parse(s.to_string()))?,
            ),
            None => None,
        };
        if words.next().is_some() {
            return Err(IntentError::Parse(s.to_string()));
        }

        if action == "theme" && arg.is_none() {
            return Ok(OperatorIntent::ToggleTheme);
        }
        Ok(OperatorIntent::Manual { action, arg })
    }
}

/// Route an intent to the link worker or the config store.
///
/// `link` is `None` while no controller link is up; manual commands then fail
/// with [`CommandError::LinkClosed`].
pub fn dispatch_intent(
    intent: &OperatorIntent,
    link: Option<&LinkHandle>,
    store: &ConfigStore,
) -> Result<(), IntentError> {
    match intent {
        OperatorIntent::Manual { action, arg } => {
            link.ok_or(CommandError::LinkClosed)?.send_manual(action, *arg)?;
            debug!("Queued manual command '{}'", action);
        }
        OperatorIntent::ToggleTheme => {
            let theme = store.theme_color().toggled();
            store.set_theme_color(theme)?;
            info!("Theme changed to {}", theme.name());
        }
    }
    Ok(())
}

//! Window/pane placement

use serde::{Deserialize, Serialize};

/// How the selection is spread over windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Split windows into panes, up to the per-window capacity
    #[default]
    Panes,
    /// One host per window (native tabs in control mode)
    Windows,
}

/// Hosts assigned to one window, as indices into the selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub name: String,
    pub hosts: Vec<usize>,
}

/// Assign `host_names.len()` hosts to windows in selection order, filling
/// each window to capacity before opening the next.
///
/// Panes mode names windows `window_name`, `window_name-2`, ...; windows mode
/// has a capacity of one and names each window after its host.
pub fn plan_windows(
    host_names: &[&str],
    mode: SessionMode,
    max_per_window: usize,
    window_name: &str,
) -> Vec<WindowPlan> {
    let capacity = match mode {
        SessionMode::Panes => max_per_window.max(1),
        SessionMode::Windows => 1,
    };

    (0..host_names.len())
        .collect::<Vec<_>>()
        .chunks(capacity)
        .enumerate()
        .map(|(i, chunk)| {
            let name = match mode {
                SessionMode::Windows => host_names[chunk[0]].to_string(),
                SessionMode::Panes if i == 0 => window_name.to_string(),
                SessionMode::Panes => format!("{}-{}", window_name, i + 1),
            };
            WindowPlan {
                name,
                hosts: chunk.to_vec(),
            }
        })
        .collect()
}

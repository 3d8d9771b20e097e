//! Session Commands

use regex::RegexBuilder;

use crate::config::Config;
use crate::session::{
    ItermBackend, SessionBackend, SessionEngine, SessionError, SessionReport, SessionRequest,
    TmuxBackend,
};
use crate::sot::Host;
use crate::ssh::SshProbe;

/// Hosts whose name or address matches any pattern (case-insensitive).
/// No patterns selects everything. Selection order follows the inventory.
pub fn select_hosts(hosts: &[Host], patterns: &[String]) -> Result<Vec<Host>, regex::Error> {
    if patterns.is_empty() {
        return Ok(hosts.to_vec());
    }

    let regexes = patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(hosts
        .iter()
        .filter(|h| regexes.iter().any(|re| re.is_match(&h.name) || re.is_match(&h.ip)))
        .cloned()
        .collect())
}

/// Build a session with the configured backend
pub async fn build_session(
    config: &Config,
    request: &SessionRequest,
) -> Result<SessionReport, SessionError> {
    let tmux = TmuxBackend::new();
    let backend: Box<dyn SessionBackend> = if config.tmux.control_with_iterm2 {
        Box::new(ItermBackend::new(tmux))
    } else {
        Box::new(tmux)
    };
    let probe = SshProbe::new();

    SessionEngine::new(backend.as_ref(), config)
        .with_probe(&probe)
        .build(request)
        .await
}

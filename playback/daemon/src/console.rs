//! Console input parsing and snapshot rendering

use playback_core::{ControllerSnapshot, Mode};

/// One line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Begin the speaking loop
    Speak,
    /// End the speaking loop
    Quiet,
    /// Switch skins immediately
    SetMode(Mode),
    /// Report user activity
    Poke,
    /// Print the current snapshot
    Status,
    /// Answer an outstanding passphrase prompt
    Passphrase(String),
    /// Exit the daemon
    Quit,
    /// Anything else: a mode command or something to "say"
    Text(String),
    /// A recognised keyword with bad arguments
    Invalid(String),
}

impl Input {
    /// Parse one line of console input; blank lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let input = match (word.to_lowercase().as_str(), rest) {
            ("speak", "") => Self::Speak,
            ("quiet", "") => Self::Quiet,
            ("poke", "") => Self::Poke,
            ("status", "") => Self::Status,
            ("quit" | "exit", "") => Self::Quit,
            ("mode", "") => Self::Invalid("usage: mode <armored|normal>".to_string()),
            ("mode", arg) => match arg.parse::<Mode>() {
                Ok(mode) => Self::SetMode(mode),
                Err(e) => Self::Invalid(e),
            },
            ("pass", "") => Self::Invalid("usage: pass <phrase>".to_string()),
            ("pass", phrase) => Self::Passphrase(phrase.to_string()),
            _ => Self::Text(line.to_string()),
        };
        Some(input)
    }
}

/// One-line human-readable summary of a snapshot
pub fn describe(snapshot: &ControllerSnapshot) -> String {
    let clip = snapshot
        .active_clip
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    let mut flags = Vec::new();
    if snapshot.speaking {
        flags.push("speaking");
    }
    if snapshot.preloading {
        flags.push("loading");
    }
    if snapshot.reply_in_flight {
        flags.push("reply");
    }
    if snapshot.idle_timer_armed {
        flags.push("timer");
    }
    format!(
        "[{mode}/{state}] {slot:?} {clip}{looped} {flags}",
        mode = snapshot.mode,
        state = snapshot.state,
        slot = snapshot.active_slot,
        looped = if snapshot.looping { " (loop)" } else { "" },
        flags = flags.join(","),
    )
}

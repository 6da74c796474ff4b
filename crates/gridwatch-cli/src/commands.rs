//! Slash command parsing

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A question for the backend
    Query(String),
    /// Start a fresh thread and clear the transcript
    Reset,
    /// Show the current thread and causal link
    Thread,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return Input::Query(line.to_string());
    }

    let command = line
        .split_whitespace()
        .next()
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match command.as_str() {
        "/reset" | "/new" => Input::Reset,
        "/thread" => Input::Thread,
        "/help" | "/?" => Input::Help,
        "/quit" | "/exit" | "/q" => Input::Quit,
        _ => Input::Unknown(command),
    }
}

pub const HELP: &str = "\
Commands:
  /reset    Start a new thread
  /thread   Show the current thread
  /help     Show this help
  /quit     Exit
Ctrl-C cancels a streaming reply; at the prompt it exits.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(
            parse_input("  Show load by feeder "),
            Input::Query("Show load by feeder".to_string())
        );
        assert_eq!(parse_input("/RESET"), Input::Reset);
        assert_eq!(parse_input("/new please"), Input::Reset);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/thread"), Input::Thread);
        assert_eq!(parse_input("/bogus x"), Input::Unknown("/bogus".to_string()));
        assert_eq!(parse_input("   "), Input::Empty);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    ForgetWifi,
    Tap { x: i32, y: i32 },
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }

    let upper = line.to_ascii_uppercase();
    let mut words = upper.split_whitespace();
    match (words.next(), words.next(), words.next(), words.next()) {
        (Some("FORGET" | "RESET_WIFI" | "CLEAR_WIFI"), None, _, _) => ConsoleCommand::ForgetWifi,
        (Some("TAP"), Some(x), Some(y), None) => match (x.parse(), y.parse()) {
            (Ok(x), Ok(y)) => ConsoleCommand::Tap { x, y },
            _ => ConsoleCommand::Unknown(upper),
        },
        _ => ConsoleCommand::Unknown(upper),
    }
}

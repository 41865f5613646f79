use chrono::NaiveDate;

use crate::service::session::Mode;

/// What a menu button does. Encoded into Telegram's 64-byte callback data,
/// so list selections carry an index into the session's last menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ChooseMode(Mode),
    Team(usize),
    Agent(usize),
    Write { overwrite: bool },
    /// Date picker navigation to a month.
    Month { year: i32, month: u32 },
    Day(NaiveDate),
    Noop,
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Self::ChooseMode(Mode::Sheet) => "mode:sheet".to_string(),
            Self::ChooseMode(Mode::Chat) => "mode:chat".to_string(),
            Self::Team(i) => format!("team:{i}"),
            Self::Agent(i) => format!("agent:{i}"),
            Self::Write { overwrite: true } => "write:overwrite".to_string(),
            Self::Write { overwrite: false } => "write:append".to_string(),
            Self::Month { year, month } => format!("cal:{year:04}-{month:02}"),
            Self::Day(date) => format!("day:{}", date.format("%Y-%m-%d")),
            Self::Noop => "noop".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (kind, value) = data.split_once(':').unwrap_or((data, ""));
        match (kind, value) {
            ("mode", "sheet") => Some(Self::ChooseMode(Mode::Sheet)),
            ("mode", "chat") => Some(Self::ChooseMode(Mode::Chat)),
            ("team", i) => i.parse().ok().map(Self::Team),
            ("agent", i) => i.parse().ok().map(Self::Agent),
            ("write", "overwrite") => Some(Self::Write { overwrite: true }),
            ("write", "append") => Some(Self::Write { overwrite: false }),
            ("cal", ym) => {
                let (y, m) = ym.split_once('-')?;
                let (year, month) = (y.parse().ok()?, m.parse().ok()?);
                NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self::Month { year, month })
            }
            ("day", d) => NaiveDate::parse_from_str(d, "%Y-%m-%d").ok().map(Self::Day),
            ("noop", "") => Some(Self::Noop),
            _ => None,
        }
    }
}

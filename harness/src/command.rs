use serde_derive::{Serialize, Deserialize};

#[derive(Serialize, Deserialize)]
pub struct Execution(pub Vec<Command>);

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start a ring member with the given parameters
    Start {
        id: usize,
        count: usize,
    },

    /// Kill the specified ring member
    Crash {
        id: usize,
    },

    /// Sleep the test harness for `ms` milliseconds
    Sleep {
        ms: u64,
    }
}

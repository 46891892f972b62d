use crossterm::event::KeyEvent;

use crate::dispatch::AgentKey;
use crate::logtail::LogWindow;
use crate::view::AgentListing;

/// Actions that can be dispatched through the watch client
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// A listing refresh has begun
    PollStarted,
    /// Fresh agent listing
    AgentsUpdated(AgentListing),
    /// Fresh log window for the selected agent
    LogUpdated(LogWindow),
    /// Request an immediate listing refresh
    Refresh,
    /// Start an agent with this task name
    StartAgent(String),
    /// Stop the agent on this port
    StopAgent(u16),
    /// Type text plus Enter into an agent
    SendText(u16, String),
    /// Press a single key in an agent
    SendKey(u16, AgentKey),
    /// A start/stop/input/key call returned
    MutationDone(Result<String, String>),
}

use crossterm::event::KeyEvent;

use viddy_core::EngineEvent;

/// Everything the app loop multiplexes over: terminal input, engine
/// notifications, and debug log lines.
#[derive(Clone, Debug)]
pub(crate) enum AppEvent {
    Key(KeyEvent),
    Resize,
    Engine(EngineEvent),
    LogLine(String),
    ExitRequest,
}

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Action {
    None,
    Quit,
    /// Run `service.capture_and_analyze`(...) on the typed path
    Analyze,
    /// Reset the retry budget and load the model again
    ReloadModel,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Backspace, Char, Down, Enter, Esc, Left, Right, Up};

    let control = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global quit shortcut
    if key.code == Char('c') && control {
        return Action::Quit;
    }

    let mut action = Action::None;

    match app.screen {
        Screen::Capture => match key.code {
            Char('r') if control => {
                action = Action::ReloadModel;
            }
            Char(character) => {
                if !control && !key.modifiers.contains(KeyModifiers::ALT) {
                    app.path_input.push(character);
                }
            }
            Backspace => {
                app.path_input.pop();
            }
            Enter => {
                action = Action::Analyze;
            }
            Right => {
                if app.bundle().is_some() {
                    app.screen = Screen::Result;
                }
            }
            _ => {}
        },

        Screen::Result => match key.code {
            Char('q') if key.modifiers.is_empty() => {
                action = Action::Quit;
            }
            Up | Char('k') => {
                app.center_index = app.center_index.saturating_sub(1);
            }
            Down | Char('j') => {
                let count = app.bundle().map_or(0, |bundle| bundle.centers.len());
                if app.center_index + 1 < count {
                    app.center_index += 1;
                }
            }
            Enter | Right => {
                app.open_selected_center();
            }
            Left | Esc | Char('b') => {
                app.back_to_capture();
            }
            _ => {}
        },

        Screen::CenterDetail => match key.code {
            Char('q') if key.modifiers.is_empty() => {
                action = Action::Quit;
            }
            Left | Esc | Char('b') => {
                app.screen = Screen::Result;
            }
            _ => {}
        },
    }
    action
}

use lexiflash_core::Screen;
use lexiflash_experiment::SequencerEvent;
use winit::keyboard::KeyCode;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Event(SequencerEvent),
    Exit,
}

/// Translates a key press on `screen` into an action. Keys with no meaning on
/// the current screen map to `None`.
pub fn map_key(screen: Screen, key: KeyCode) -> Option<Action> {
    let event = match key {
        KeyCode::Escape => return Some(Action::Exit),
        KeyCode::Space | KeyCode::Enter | KeyCode::NumpadEnter => match screen {
            Screen::Welcome => SequencerEvent::StartRequested,
            Screen::BlockInstructions => SequencerEvent::BeginBlock,
            Screen::BlockPause => SequencerEvent::ContinueRequested,
            Screen::StimulusUnavailable => SequencerEvent::RetryFetch,
            _ => return None,
        },
        _ => match (screen, choice_digit(key)) {
            (_, Some(digit)) => SequencerEvent::KeyPressed(digit),
            (Screen::Results, None) => match key {
                KeyCode::KeyS => SequencerEvent::SubmitRequested,
                KeyCode::KeyY => SequencerEvent::SubmitConfirmed,
                KeyCode::KeyN => SequencerEvent::SubmitCancelled,
                KeyCode::KeyR => SequencerEvent::RestartRequested,
                _ => return None,
            },
            _ => return None,
        },
    };
    Some(Action::Event(event))
}

fn choice_digit(key: KeyCode) -> Option<char> {
    match key {
        KeyCode::Digit1 | KeyCode::Numpad1 => Some('1'),
        KeyCode::Digit2 | KeyCode::Numpad2 => Some('2'),
        KeyCode::Digit3 | KeyCode::Numpad3 => Some('3'),
        KeyCode::Digit4 | KeyCode::Numpad4 => Some('4'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(screen: Screen, key: KeyCode) -> Option<SequencerEvent> {
        match map_key(screen, key) {
            Some(Action::Event(e)) => Some(e),
            _ => None,
        }
    }

    #[test]
    fn space_advances_depending_on_screen() {
        assert_eq!(
            event(Screen::Welcome, KeyCode::Space),
            Some(SequencerEvent::StartRequested)
        );
        assert_eq!(
            event(Screen::BlockInstructions, KeyCode::Enter),
            Some(SequencerEvent::BeginBlock)
        );
        assert_eq!(
            event(Screen::BlockPause, KeyCode::Space),
            Some(SequencerEvent::ContinueRequested)
        );
        assert_eq!(
            event(Screen::StimulusUnavailable, KeyCode::Space),
            Some(SequencerEvent::RetryFetch)
        );
        assert_eq!(event(Screen::FixationCross, KeyCode::Space), None);
    }

    #[test]
    fn digits_and_numpad_map_to_choice_keys() {
        assert_eq!(
            event(Screen::ChoicePresented, KeyCode::Digit3),
            Some(SequencerEvent::KeyPressed('3'))
        );
        assert_eq!(
            event(Screen::ChoicePresented, KeyCode::Numpad1),
            Some(SequencerEvent::KeyPressed('1'))
        );
        assert_eq!(event(Screen::ChoicePresented, KeyCode::Digit5), None);
    }

    #[test]
    fn result_keys_only_on_results() {
        assert_eq!(
            event(Screen::Results, KeyCode::KeyS),
            Some(SequencerEvent::SubmitRequested)
        );
        assert_eq!(
            event(Screen::Results, KeyCode::KeyR),
            Some(SequencerEvent::RestartRequested)
        );
        assert_eq!(event(Screen::ChoicePresented, KeyCode::KeyR), None);
        assert_eq!(map_key(Screen::StimulusShown, KeyCode::Escape), Some(Action::Exit));
    }
}

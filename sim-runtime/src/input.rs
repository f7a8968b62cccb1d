// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Input snapshot polled by scripts
//!
//! Capture happens in the host. The world only records which keys are held
//! so behaviors can ask "is this key down" during their update.

use std::collections::HashSet;

/// Current key and pointer state
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pressed: HashSet<String>,
    mouse_position: (f64, f64),
    mouse_buttons: HashSet<u8>,
}

impl InputState {
    /// Create an empty input state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is held. Keys compare case-insensitively.
    pub fn is_key_down(&self, key: &str) -> bool {
        self.pressed.contains(&key.to_ascii_lowercase())
    }

    /// Record a key press. Returns false if the key was already held.
    pub fn press(&mut self, key: &str) -> bool {
        self.pressed.insert(key.to_ascii_lowercase())
    }

    /// Record a key release. Returns false if the key was not held.
    pub fn release(&mut self, key: &str) -> bool {
        self.pressed.remove(&key.to_ascii_lowercase())
    }

    /// Keys currently held
    pub fn pressed_keys(&self) -> impl Iterator<Item = &str> {
        self.pressed.iter().map(String::as_str)
    }

    /// Pointer position in host coordinates
    pub fn mouse_position(&self) -> (f64, f64) {
        self.mouse_position
    }

    /// Update the pointer position
    pub fn set_mouse_position(&mut self, x: f64, y: f64) {
        self.mouse_position = (x, y);
    }

    /// Whether a pointer button is held
    pub fn is_button_down(&self, button: u8) -> bool {
        self.mouse_buttons.contains(&button)
    }

    /// Record a pointer button change
    pub fn set_button(&mut self, button: u8, down: bool) {
        if down {
            self.mouse_buttons.insert(button);
        } else {
            self.mouse_buttons.remove(&button);
        }
    }

    /// Release everything, e.g. when the host loses focus
    pub fn clear(&mut self) {
        self.pressed.clear();
        self.mouse_buttons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_and_release() {
        let mut input = InputState::new();
        assert!(input.press("W"));
        assert!(!input.press("w"));
        assert!(input.is_key_down("w"));
        assert!(input.release("W"));
        assert!(!input.is_key_down("w"));
        assert!(!input.release("w"));
    }

    #[test]
    fn test_buttons() {
        let mut input = InputState::new();
        input.set_button(0, true);
        assert!(input.is_button_down(0));
        input.clear();
        assert!(!input.is_button_down(0));
    }
}

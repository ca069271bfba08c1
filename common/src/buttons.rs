use std::collections::BTreeMap;

use log::info;

use crate::{
    error::StorageError,
    settings::{Layout, MAX_BUTTONS},
    storage::{load_or, KvStore, NS_BUTTONS},
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Button {
    pub x: i32,
    pub y: i32,
    pub size: i32,
    pub on: bool,
    pub label: String,
    last_toggle_ms: Option<u64>,
}

impl Button {
    pub fn contains(&self, px: i32, py: i32) -> bool {
        self.size > 0
            && px >= self.x
            && px <= self.x + self.size - 1
            && py >= self.y
            && py <= self.y + self.size - 1
    }
}

#[derive(Debug, Clone)]
pub struct ButtonGrid {
    buttons: [Button; MAX_BUTTONS],
    layout: Layout,
    debounce_ms: u64,
    max_label_chars: usize,
}

impl ButtonGrid {
    pub fn new(debounce_ms: u64, max_label_chars: usize) -> Self {
        Self {
            buttons: Default::default(),
            layout: Layout::default(),
            debounce_ms,
            max_label_chars,
        }
    }

    pub fn count(&self) -> usize {
        self.layout.button_count()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn active(&self) -> &[Button] {
        &self.buttons[..self.count()]
    }

    pub fn button(&self, index: usize) -> Option<&Button> {
        self.active().get(index)
    }

    pub fn compute_layout(&mut self, layout: Layout, width: i32, height: i32) {
        self.layout = layout;

        let margin = (width.min(height) / 20).max(8);
        let columns = layout.columns() as i32;
        let rows = 2;
        let available_w = width - margin * (columns + 1);
        let available_h = height - margin * (rows + 1);
        let size = (available_w / columns).min(available_h / rows).max(0);
        let start_x = (width - (size * columns + margin * (columns - 1))) / 2;
        let start_y = (height - (size * rows + margin * (rows - 1))) / 2;

        for (index, button) in self.buttons.iter_mut().enumerate() {
            button.last_toggle_ms = None;
            if index >= layout.button_count() {
                continue;
            }
            let column = index as i32 % columns;
            let row = index as i32 / columns;
            button.x = start_x + column * (size + margin);
            button.y = start_y + row * (size + margin);
            button.size = size;
            if button.label.is_empty() {
                button.label = (index + 1).to_string();
            }
        }
    }

    pub fn hit_test(&self, px: i32, py: i32) -> Option<usize> {
        self.active()
            .iter()
            .position(|button| button.contains(px, py))
    }

    /// Flips the button unless it was toggled within the debounce window.
    /// Persisting and redrawing are left to the caller.
    pub fn toggle(&mut self, index: usize, now_ms: u64) -> bool {
        if index >= self.count() {
            return false;
        }
        let debounce_ms = self.debounce_ms;
        let button = &mut self.buttons[index];
        if let Some(last) = button.last_toggle_ms {
            if now_ms.saturating_sub(last) <= debounce_ms {
                return false;
            }
        }
        button.on = !button.on;
        button.last_toggle_ms = Some(now_ms);
        info!("button {} toggled -> {}", index + 1, button.on);
        true
    }

    pub fn set_label(&mut self, index: usize, text: &str) -> bool {
        if index >= self.count() {
            return false;
        }
        let label: String = text.chars().take(self.max_label_chars).collect();
        let button = &mut self.buttons[index];
        if button.label == label {
            return false;
        }
        info!("button {}: `{}` -> `{}`", index + 1, button.label, label);
        button.label = label;
        true
    }

    pub fn state_map(&self) -> BTreeMap<String, bool> {
        self.active()
            .iter()
            .enumerate()
            .map(|(index, button)| ((index + 1).to_string(), button.on))
            .collect()
    }

    pub fn load(&mut self, store: &dyn KvStore) {
        for (index, button) in self.buttons.iter_mut().enumerate() {
            let state_key = state_key(index);
            let label_key = label_key(index);
            button.on = load_or(
                store.get_bool(NS_BUTTONS, &state_key),
                NS_BUTTONS,
                &state_key,
                false,
            );
            button.label = load_or(
                store.get_str(NS_BUTTONS, &label_key),
                NS_BUTTONS,
                &label_key,
                (index + 1).to_string(),
            );
        }
    }

    pub fn save(&self, store: &mut dyn KvStore) -> Result<(), StorageError> {
        for (index, button) in self.buttons.iter().enumerate() {
            store.set_bool(NS_BUTTONS, &state_key(index), button.on)?;
            store.set_str(NS_BUTTONS, &label_key(index), &button.label)?;
        }
        Ok(())
    }
}

fn state_key(index: usize) -> String {
    format!("state{index}")
}

fn label_key(index: usize) -> String {
    format!("label{index}")
}

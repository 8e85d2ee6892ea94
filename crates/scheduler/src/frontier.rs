//! Pointer arithmetic over the layer store.

use taskstack_core::{ExecutionPointer, Position, Slot};

use crate::store::LayerStore;

/// First slot that exists strictly after `after`.
///
/// With no pointer the scan starts at the first slot of layer 0. Missing
/// hooks and empty layers are skipped. `None` means the stack is exhausted.
pub fn next_position(layers: &LayerStore, after: Option<Position>) -> Option<Position> {
    let start = match after {
        None => Position::new(0, Slot::PreHook),
        Some(p) => successor(p),
    };
    first_existing_from(layers, start)
}

fn successor(p: Position) -> Position {
    match p.slot {
        Slot::PreHook => Position::new(p.layer, Slot::Task(0)),
        Slot::Task(i) => Position::new(p.layer, Slot::Task(i + 1)),
        Slot::PostHook => Position::new(p.layer + 1, Slot::PreHook),
    }
}

fn first_existing_from(layers: &LayerStore, start: Position) -> Option<Position> {
    let Position { mut layer, mut slot } = start;
    loop {
        let current = layers.get(layer)?;
        match slot {
            Slot::PreHook => {
                if current.pre_hook.is_some() {
                    return Some(Position::new(layer, slot));
                }
                slot = Slot::Task(0);
            }
            Slot::Task(i) => {
                if i < current.entries.len() {
                    return Some(Position::new(layer, slot));
                }
                slot = Slot::PostHook;
            }
            Slot::PostHook => {
                if current.post_hook.is_some() {
                    return Some(Position::new(layer, slot));
                }
                layer += 1;
                slot = Slot::PreHook;
            }
        }
    }
}

/// Whether `position` is executed or executing.
pub fn is_frozen(pointer: Option<&ExecutionPointer>, position: Position) -> bool {
    pointer.is_some_and(|p| position <= p.position())
}

/// Whether the whole layer is closed to hook edits and layer insertion.
///
/// A layer is closed once the pointer has entered it.
pub fn is_layer_frozen(pointer: Option<&ExecutionPointer>, index: usize) -> bool {
    pointer.is_some_and(|p| index <= p.layer_index)
}

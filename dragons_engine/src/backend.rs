use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::world::World;

/// Rendering/audio collaborator. Called once per tick; the engine core
/// never observes return values from it.
pub trait Backend {
    fn draw(&mut self, world: &World);
    fn present(&mut self);
    fn play_sound(&mut self, sound_id: u16);
}

/// Headless backend: counts frames and records sound requests so runs and
/// tests can assert on them.
#[derive(Debug, Default)]
pub struct NullBackend {
    pub frames_presented: u64,
    pub sounds: Vec<u16>,
}

impl Backend for NullBackend {
    fn draw(&mut self, _world: &World) {}

    fn present(&mut self) {
        self.frames_presented += 1;
    }

    fn play_sound(&mut self, sound_id: u16) {
        self.sounds.push(sound_id);
    }
}

/// Raw input events delivered by the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Quit,
    MouseMove { x: i16, y: i16 },
    LeftButtonUp,
    RightButtonUp,
    InventoryButtonUp,
}

/// Input collaborator; the scheduler drains it once per tick.
pub trait EventSource {
    fn poll(&mut self) -> Option<InputEvent>;
}

/// Event source fed from a shared queue. Tests and the headless binary
/// keep the handle and push events between ticks.
#[derive(Debug, Default)]
pub struct ScriptedEvents {
    queue: Rc<RefCell<VecDeque<InputEvent>>>,
}

impl ScriptedEvents {
    pub fn new() -> Self {
        ScriptedEvents::default()
    }

    pub fn handle(&self) -> EventHandle {
        EventHandle {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl EventSource for ScriptedEvents {
    fn poll(&mut self) -> Option<InputEvent> {
        self.queue.borrow_mut().pop_front()
    }
}

/// Push side of a `ScriptedEvents` queue.
#[derive(Debug, Clone)]
pub struct EventHandle {
    queue: Rc<RefCell<VecDeque<InputEvent>>>,
}

impl EventHandle {
    pub fn push(&self, event: InputEvent) {
        self.queue.borrow_mut().push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_events_drain_in_order() {
        let mut source = ScriptedEvents::new();
        let handle = source.handle();
        handle.push(InputEvent::LeftButtonUp);
        handle.push(InputEvent::Quit);
        assert_eq!(source.poll(), Some(InputEvent::LeftButtonUp));
        assert_eq!(source.poll(), Some(InputEvent::Quit));
        assert_eq!(source.poll(), None);
    }
}

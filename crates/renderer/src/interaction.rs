//! Pointer and wheel state feeding the `mouse` and `wheel`/`force` uniforms.
//!
//! Handlers only record numbers here; the frame scheduler reads them when it
//! pushes uniforms for the next draw.

/// Pointer position in viewport pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub page_x: f64,
    pub page_y: f64,
}

/// Scroll deltas in pixels, positive `delta_y` meaning "scroll down".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub delta_x: f64,
    pub delta_y: f64,
}

/// Size of the viewport the pointer coordinates are relative to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Maps a viewport position onto shader space: x grows right, y grows up.
pub fn normalize_pointer(event: PointerEvent, viewport: Viewport) -> Option<[f32; 2]> {
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
        return None;
    }
    let x = -1.0 + 2.0 * event.page_x / viewport.width;
    let y = 1.0 - 2.0 * event.page_y / viewport.height;
    Some([x as f32, y as f32])
}

#[derive(Debug, Clone, Default)]
pub struct InteractionState {
    pointer: [f32; 2],
    accumulator: [f64; 2],
    force_override: Option<[f32; 2]>,
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointer_moved(&mut self, event: PointerEvent, viewport: Viewport) {
        if let Some(pointer) = normalize_pointer(event, viewport) {
            self.pointer = pointer;
        }
    }

    /// Adds the deltas to the accumulator unless a manual force is pinned.
    pub fn wheel(&mut self, event: WheelEvent) {
        if self.force_override.is_some() {
            return;
        }
        self.accumulator[0] += event.delta_x;
        self.accumulator[1] += event.delta_y;
    }

    /// Pins the force to `value` and ignores wheel events until released.
    pub fn set_force(&mut self, value: [f32; 2]) {
        self.force_override = Some(value);
    }

    /// Leaves manual mode; the accumulator resumes where it stopped.
    pub fn release_force(&mut self) {
        self.force_override = None;
    }

    pub fn is_force_overridden(&self) -> bool {
        self.force_override.is_some()
    }

    pub fn recenter(&mut self) {
        self.accumulator = [0.0; 2];
    }

    pub fn pointer(&self) -> [f32; 2] {
        self.pointer
    }

    /// Raw linear force: the pinned value in manual mode, the accumulator otherwise.
    pub fn force(&self) -> [f32; 2] {
        match self.force_override {
            Some(value) => value,
            None => [self.accumulator[0] as f32, self.accumulator[1] as f32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(page_x: f64, page_y: f64) -> PointerEvent {
        PointerEvent { page_x, page_y }
    }

    fn scroll(delta_x: f64, delta_y: f64) -> WheelEvent {
        WheelEvent { delta_x, delta_y }
    }

    #[test]
    fn pointer_corners_and_center_map_exactly() {
        let viewport = Viewport::new(800.0, 600.0);
        assert_eq!(normalize_pointer(at(400.0, 300.0), viewport), Some([0.0, 0.0]));
        assert_eq!(normalize_pointer(at(0.0, 0.0), viewport), Some([-1.0, 1.0]));
        assert_eq!(normalize_pointer(at(800.0, 600.0), viewport), Some([1.0, -1.0]));
        assert_eq!(normalize_pointer(at(200.0, 450.0), viewport), Some([-0.5, -0.5]));
    }

    #[test]
    fn pointer_inside_viewport_stays_in_unit_square() {
        let viewport = Viewport::new(1920.0, 1080.0);
        for step_x in 0..=32 {
            for step_y in 0..=32 {
                let event = at(1920.0 * step_x as f64 / 32.0, 1080.0 * step_y as f64 / 32.0);
                let [x, y] = normalize_pointer(event, viewport).unwrap();
                assert!((-1.0..=1.0).contains(&x), "x out of range: {x}");
                assert!((-1.0..=1.0).contains(&y), "y out of range: {y}");
            }
        }
    }

    #[test]
    fn zero_viewport_keeps_previous_pointer() {
        let mut state = InteractionState::new();
        state.pointer_moved(at(10.0, 10.0), Viewport::new(20.0, 20.0));
        state.pointer_moved(at(5.0, 5.0), Viewport::new(0.0, 20.0));
        assert_eq!(state.pointer(), [0.0, 0.0]);
    }

    #[test]
    fn wheel_accumulates_in_any_order() {
        let deltas = [(3.0, -100.0), (-1.0, 53.0), (0.0, 250.0), (12.0, -7.0)];
        let mut forward = InteractionState::new();
        for (x, y) in deltas {
            forward.wheel(scroll(x, y));
        }
        let mut backward = InteractionState::new();
        for (x, y) in deltas.iter().rev() {
            backward.wheel(scroll(*x, *y));
        }
        assert_eq!(forward.force(), [14.0, 196.0]);
        assert_eq!(forward.force(), backward.force());
    }

    #[test]
    fn accumulator_is_unbounded() {
        let mut state = InteractionState::new();
        for _ in 0..1_000 {
            state.wheel(scroll(0.0, 100.0));
        }
        assert_eq!(state.force(), [0.0, 100_000.0]);
    }

    #[test]
    fn manual_force_ignores_wheel_until_released() {
        let mut state = InteractionState::new();
        state.wheel(scroll(0.0, 40.0));
        state.set_force([0.0, 500.0]);
        state.wheel(scroll(0.0, 1_000.0));
        assert_eq!(state.force(), [0.0, 500.0]);
        state.release_force();
        assert_eq!(state.force(), [0.0, 40.0]);
    }

    #[test]
    fn recenter_is_the_only_reset() {
        let mut state = InteractionState::new();
        state.wheel(scroll(5.0, 5.0));
        state.pointer_moved(at(0.0, 0.0), Viewport::new(10.0, 10.0));
        assert_eq!(state.force(), [5.0, 5.0]);
        state.recenter();
        assert_eq!(state.force(), [0.0, 0.0]);
        assert_eq!(state.pointer(), [-1.0, 1.0]);
    }
}

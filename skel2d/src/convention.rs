use std::sync::atomic::{AtomicBool, Ordering};

// Process-global like the other runtimes: one flag picked at startup, read whenever a skeleton
// instance is created.
static Y_DOWN: AtomicBool = AtomicBool::new(false);

/// Screen-space orientation of the world Y axis.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Convention {
    #[default]
    YUp,
    YDown,
}

impl Convention {
    /// Multiplier applied to the skeleton's Y scale.
    pub fn y_sign(self) -> f32 {
        match self {
            Convention::YUp => 1.0,
            Convention::YDown => -1.0,
        }
    }
}

/// Sets the convention picked up by skeletons created afterwards.
///
/// Existing skeletons keep the convention they captured at creation.
pub fn set_default_convention(convention: Convention) {
    Y_DOWN.store(convention == Convention::YDown, Ordering::Relaxed);
}

pub fn default_convention() -> Convention {
    if Y_DOWN.load(Ordering::Relaxed) {
        Convention::YDown
    } else {
        Convention::YUp
    }
}

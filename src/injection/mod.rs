mod dispatcher;
mod keymap;
mod mock;
#[cfg(windows)]
mod sendinput;
mod surface;
#[cfg(target_os = "linux")]
mod xdotool;

pub use dispatcher::{
    scale_delta, InjectionDispatcher, InjectionDispatcherBuilder, InjectionOutcome,
    InjectionStats, SurfaceFactory,
};
pub use keymap::{resolve_key, Key, KeyTarget, KeyboardLayout};
pub use mock::{MockInputSurface, SurfaceCall};
#[cfg(windows)]
pub use sendinput::SendInputSurface;
pub use surface::{detect_surface, InputSurface, MouseButton, SurfaceKind};
#[cfg(target_os = "linux")]
pub use xdotool::XdotoolSurface;

//! Live preview of annotated frames.
//!
//! The window is only available with the `gui` feature; without it, or when
//! the window cannot be created, frames are dropped and the loop paces itself
//! with a short sleep.

use image::RgbImage;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewEvent {
    Continue,
    /// The user pressed `q`/Escape or closed the window.
    Quit,
}

pub trait Preview {
    fn present(&mut self, image: &RgbImage) -> PreviewEvent;
}

impl<T: Preview + ?Sized> Preview for Box<T> {
    fn present(&mut self, image: &RgbImage) -> PreviewEvent {
        (**self).present(image)
    }
}

/// No window: sleep briefly each iteration.
pub struct Headless {
    sleep: Duration,
}

impl Headless {
    pub fn new(sleep: Duration) -> Self {
        Self { sleep }
    }
}

impl Preview for Headless {
    fn present(&mut self, _image: &RgbImage) -> PreviewEvent {
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        PreviewEvent::Continue
    }
}

/// Preview for the configured mode.
pub fn open(headless: bool, sleep: Duration) -> Box<dyn Preview> {
    if headless {
        tracing::info!("running headless");
        return Box::new(Headless::new(sleep));
    }

    #[cfg(feature = "gui")]
    {
        Box::new(window::Window::new(sleep))
    }

    #[cfg(not(feature = "gui"))]
    {
        tracing::warn!("built without the gui feature, running headless");
        Box::new(Headless::new(sleep))
    }
}

#[cfg(feature = "gui")]
mod window {
    use super::{Headless, Preview, PreviewEvent};
    use image::RgbImage;
    use minifb::{Key, KeyRepeat, ScaleMode, WindowOptions};
    use std::time::Duration;

    const TITLE: &str = "Attendance System";

    /// minifb window, created on the first frame so it takes the camera's size.
    pub struct Window {
        window: Option<minifb::Window>,
        buffer: Vec<u32>,
        fallback: Option<Headless>,
        sleep: Duration,
    }

    impl Window {
        pub fn new(sleep: Duration) -> Self {
            Self {
                window: None,
                buffer: Vec::new(),
                fallback: None,
                sleep,
            }
        }

        fn ensure_window(&mut self, width: usize, height: usize) -> Option<&mut minifb::Window> {
            if self.window.is_none() && self.fallback.is_none() {
                let options = WindowOptions {
                    resize: true,
                    scale_mode: ScaleMode::AspectRatioStretch,
                    ..WindowOptions::default()
                };
                match minifb::Window::new(TITLE, width, height, options) {
                    Ok(window) => self.window = Some(window),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot open preview window, running headless");
                        self.fallback = Some(Headless::new(self.sleep));
                    }
                }
            }
            self.window.as_mut()
        }
    }

    impl Preview for Window {
        fn present(&mut self, image: &RgbImage) -> PreviewEvent {
            if let Some(headless) = self.fallback.as_mut() {
                return headless.present(image);
            }

            let (width, height) = (image.width() as usize, image.height() as usize);
            let mut buffer = std::mem::take(&mut self.buffer);
            buffer.clear();
            buffer.extend(
                image
                    .pixels()
                    .map(|p| (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32),
            );

            let event = match self.ensure_window(width, height) {
                None => PreviewEvent::Continue,
                Some(window) => {
                    if let Err(e) = window.update_with_buffer(&buffer, width, height) {
                        tracing::warn!(error = %e, "preview update failed");
                    }
                    let quit = !window.is_open()
                        || window.is_key_down(Key::Escape)
                        || window.is_key_pressed(Key::Q, KeyRepeat::No);
                    if quit {
                        PreviewEvent::Quit
                    } else {
                        PreviewEvent::Continue
                    }
                }
            };
            self.buffer = buffer;
            event
        }
    }
}

pub mod chromium;
pub mod connection;
pub mod engine;
pub mod headless;

pub use chromium::ChromiumLauncher;
pub use engine::{BrowserLauncher, EngineError, LaunchedBrowser, RenderBrowser, RenderPage};
pub use headless::HeadlessSettings;

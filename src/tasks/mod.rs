mod fallback;

pub use fallback::FallbackTask;

mod settings;

pub use settings::{
    DispatchConfig, FallbackConfig, NotificationConfig, ServerConfig, Settings, VapidConfig,
};

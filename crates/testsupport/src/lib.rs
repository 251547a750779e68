pub mod telegram;
pub mod transkriptor;
pub mod wait;

pub use telegram::*;
pub use transkriptor::*;
pub use wait::*;

use scribe_models::Config;

pub const TEST_BOT_TOKEN: &str = "12345:test-token";
pub const TEST_API_KEY: &str = "test-api-key";

/// Service config pointing at the two fakes with short timeouts.
pub fn test_config(telegram: &FakeTelegram, transkriptor: &FakeTranskriptor) -> Config {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1".to_string();
    config.server.port = 0;
    config.telegram.bot_token = TEST_BOT_TOKEN.to_string();
    config.telegram.api_base = telegram.base_url.clone();
    config.telegram.request_timeout_secs = 5;
    config.telegram.upload_timeout_secs = 5;
    config.transkriptor.api_key = TEST_API_KEY.to_string();
    config.transkriptor.api_base = transkriptor.base_url.clone();
    config.transkriptor.request_timeout_secs = 5;
    config
}

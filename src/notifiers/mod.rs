pub mod telegram;
pub mod vk;

pub use telegram::TelegramNotifier;
pub use vk::VkNotifier;

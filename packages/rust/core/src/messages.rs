//! User-facing reply texts.

/// Reply to a bare `/start`.
pub const GREETING: &str = "Привет, укажите url в одной строке с командой /start";

/// Reply to a question when no website is on record for the conversation.
pub const NO_SITE_YET: &str = "Пожалуйста, сначала укажите URL.";

/// Reply to a message without text (photo, sticker, etc.).
pub const TEXT_ONLY: &str = "Сообщение должно содержать исключительно текст";

/// Reply when the website could not be turned into a usable URL.
pub const INVALID_SITE: &str =
    "Не удалось обработать ссылку на сайт. Проверьте адрес и попробуйте снова.";

/// Reply when the website context could not be saved or loaded.
pub const STORAGE_FAILED: &str =
    "Не удалось сохранить информацию о сайте. Попробуйте ещё раз позже.";

/// Generic reply for anything else that went wrong.
pub const PROCESSING_FAILED: &str = "Произошла ошибка при обработке сообщения.";

/// Reply when the stored page text is empty, so there is nothing to talk about.
pub const INSUFFICIENT_INFO: &str = "Недостаточно информации о компании: не удалось загрузить сайт. \
Отправьте ссылку на сайт компании командой /start example.com";

/// Reply when no reply model is configured.
pub const SERVICE_UNAVAILABLE: &str = "Сервис временно недоступен.";

/// Reply when the reply model call fails.
pub const GENERATION_FAILED: &str = "Ошибка генерации ответа.";

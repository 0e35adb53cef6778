//! Chat-style command front end.
//!
//! [`ChatFrontEnd::handle`] takes one message from one user and returns the
//! reply. Slash commands are dispatched directly; plain text only matters
//! while a `/login` conversation is waiting for a username or password.
//! Every portal call opens its own client through
//! [`SchoolsClient::scoped`], so concurrent users never share HTTP state.

use std::collections::HashMap;

use chrono::NaiveDate;
use schools_portal::{
    GradePeriod, PortalConfig, PortalResult, ResponseEnvelope, SchoolsClient,
};
use tokio::sync::Mutex;

use crate::render;
use crate::sessions::{UserId, UserSession, UserSessions};

pub const START_TEXT: &str = "🏫 Добро пожаловать в Schools.tg!

Этот бот позволяет получать доступ к вашим данным из системы schools.by:
📅 Расписание занятий
📊 Оценки
📝 Домашние задания
📢 Объявления

Для начала работы войдите в систему командой /login
Список всех команд: /help";

pub const HELP_TEXT: &str = "🔧 Доступные команды:

🔑 Аутентификация:
/login - Войти в систему schools.by
/logout - Выйти из системы
/cancel - Отменить вход

📚 Основные функции:
/schedule [ГГГГ-ММ-ДД] - Расписание занятий
/grades [quarter|semester|year] - Оценки
/homework [ГГГГ-ММ-ДД] - Домашние задания
/announcements - Объявления
/profile - Информация о профиле
/search <запрос> - Поиск школ

ℹ️ Справка:
/help - Показать это сообщение
/start - Начать работу с ботом";

pub const UNKNOWN_TEXT: &str =
    "❓ Неизвестная команда.\nИспользуйте /help для просмотра доступных команд.";

const ALREADY_LOGGED_IN_TEXT: &str = "Вы уже вошли в систему! Используйте /logout для выхода.";

const ASK_USERNAME_TEXT: &str = "🔑 Вход в систему schools.by

Введите ваш логин (имя пользователя):

Для отмены используйте команду /cancel";

const CANCELLED_TEXT: &str =
    "❌ Операция отменена.\nИспользуйте /start для возврата к главному меню.";

const NOTHING_TO_CANCEL_TEXT: &str = "Нечего отменять.";

const LOGGED_OUT_TEXT: &str =
    "✅ Вы успешно вышли из системы.\nИспользуйте /login для повторного входа.";

const NOT_LOGGED_IN_TEXT: &str = "ℹ️ Вы не были авторизованы в системе.";

const PLAIN_TEXT_HINT: &str = "Используйте /help для просмотра доступных команд.";

/// Where a user is in the `/login` conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoginStep {
    AwaitingUsername,
    AwaitingPassword { username: String },
}

/// One data page a logged-in user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRequest {
    Profile,
    Schedule(Option<NaiveDate>),
    Grades(Option<GradePeriod>),
    Homework(Option<NaiveDate>),
    Announcements,
}

impl DataRequest {
    /// Parse a data command and its argument.
    pub fn parse(command: &str, args: &str) -> Option<Result<Self, String>> {
        let request = match command {
            "profile" => Ok(DataRequest::Profile),
            "announcements" => Ok(DataRequest::Announcements),
            "schedule" => parse_date(args).map(DataRequest::Schedule),
            "homework" => parse_date(args).map(DataRequest::Homework),
            "grades" => parse_period(args).map(DataRequest::Grades),
            _ => return None,
        };
        Some(request)
    }

    /// What the user needs to be logged in for, in reply text.
    fn subject(self) -> &'static str {
        match self {
            DataRequest::Profile => "профиля",
            DataRequest::Schedule(_) => "расписания",
            DataRequest::Grades(_) => "оценок",
            DataRequest::Homework(_) => "домашних заданий",
            DataRequest::Announcements => "объявлений",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            DataRequest::Profile => "👤 Профиль",
            DataRequest::Schedule(_) => "📅 Расписание занятий",
            DataRequest::Grades(_) => "📊 Оценки",
            DataRequest::Homework(_) => "📝 Домашние задания",
            DataRequest::Announcements => "📢 Объявления",
        }
    }

    pub async fn fetch(self, client: &SchoolsClient) -> PortalResult<ResponseEnvelope> {
        match self {
            DataRequest::Profile => client.get_user_info().await,
            DataRequest::Schedule(date) => client.get_schedule(date).await,
            DataRequest::Grades(period) => client.get_grades(period).await,
            DataRequest::Homework(date) => client.get_homework(date).await,
            DataRequest::Announcements => client.get_announcements().await,
        }
    }
}

/// Accepts `2024-09-02` or `02.09.2024`; empty means no date.
pub fn parse_date(args: &str) -> Result<Option<NaiveDate>, String> {
    let args = args.trim();
    if args.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(args, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(args, "%d.%m.%Y"))
        .map(Some)
        .map_err(|_| format!("Неверная дата: {args}. Используйте формат ГГГГ-ММ-ДД."))
}

fn parse_period(args: &str) -> Result<Option<GradePeriod>, String> {
    let args = args.trim();
    if args.is_empty() {
        return Ok(None);
    }
    args.parse::<GradePeriod>()
        .map(Some)
        .map_err(|_| format!("Неверный период: {args}. Допустимо: quarter, semester, year."))
}

/// Split `/command@bot args` into `("command", "args")`.
fn split_command(text: &str) -> Option<(String, &str)> {
    let rest = text.strip_prefix('/')?;
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let command = head.split('@').next().unwrap_or(head).to_lowercase();
    Some((command, args.trim()))
}

/// Dispatcher shared by every chat user.
pub struct ChatFrontEnd {
    config: PortalConfig,
    sessions: Mutex<UserSessions>,
    conversations: Mutex<HashMap<UserId, LoginStep>>,
}

impl ChatFrontEnd {
    pub fn new(config: PortalConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(UserSessions::new()),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub async fn is_logged_in(&self, user_id: UserId) -> bool {
        self.sessions.lock().await.is_authenticated(user_id)
    }

    /// Username of the user's session, if any.
    pub async fn username(&self, user_id: UserId) -> Option<String> {
        self.sessions
            .lock()
            .await
            .get(user_id)
            .map(|s| s.username.clone())
    }

    /// Whether a `/login` conversation is waiting for input from the user.
    pub async fn awaiting_input(&self, user_id: UserId) -> bool {
        self.conversations.lock().await.contains_key(&user_id)
    }

    /// Whether the next plain-text input from the user is a password.
    pub async fn awaiting_password(&self, user_id: UserId) -> bool {
        matches!(
            self.conversations.lock().await.get(&user_id),
            Some(LoginStep::AwaitingPassword { .. })
        )
    }

    /// Handle one incoming message and produce the reply.
    pub async fn handle(&self, user_id: UserId, text: &str) -> String {
        let text = text.trim();
        let Some((command, args)) = split_command(text) else {
            return self.handle_text(user_id, text).await;
        };

        tracing::debug!(user_id, command = %command, "chat command");

        if let Some(request) = DataRequest::parse(&command, args) {
            return match request {
                Ok(request) => self.data(user_id, request).await,
                Err(usage) => usage,
            };
        }

        match command.as_str() {
            "start" => START_TEXT.to_string(),
            "help" => HELP_TEXT.to_string(),
            "login" => self.begin_login(user_id).await,
            "cancel" => self.cancel(user_id).await,
            "logout" => self.logout(user_id).await,
            "search" => self.search(args).await,
            _ => UNKNOWN_TEXT.to_string(),
        }
    }

    async fn begin_login(&self, user_id: UserId) -> String {
        if self.sessions.lock().await.contains(user_id) {
            return ALREADY_LOGGED_IN_TEXT.to_string();
        }
        self.conversations
            .lock()
            .await
            .insert(user_id, LoginStep::AwaitingUsername);
        ASK_USERNAME_TEXT.to_string()
    }

    async fn cancel(&self, user_id: UserId) -> String {
        match self.conversations.lock().await.remove(&user_id) {
            Some(_) => CANCELLED_TEXT.to_string(),
            None => NOTHING_TO_CANCEL_TEXT.to_string(),
        }
    }

    async fn logout(&self, user_id: UserId) -> String {
        match self.sessions.lock().await.remove(user_id) {
            Some(_) => LOGGED_OUT_TEXT.to_string(),
            None => NOT_LOGGED_IN_TEXT.to_string(),
        }
    }

    async fn handle_text(&self, user_id: UserId, text: &str) -> String {
        let step = self.conversations.lock().await.remove(&user_id);
        match step {
            Some(LoginStep::AwaitingUsername) => {
                if text.is_empty() {
                    self.conversations
                        .lock()
                        .await
                        .insert(user_id, LoginStep::AwaitingUsername);
                    return "Логин не может быть пустым. Введите логин:".to_string();
                }
                let username = text.to_string();
                let reply = format!("Логин принят: {username}\n\nТеперь введите ваш пароль:");
                self.conversations
                    .lock()
                    .await
                    .insert(user_id, LoginStep::AwaitingPassword { username });
                reply
            }
            Some(LoginStep::AwaitingPassword { username }) => {
                self.finish_login(user_id, username, text.to_string()).await
            }
            None => PLAIN_TEXT_HINT.to_string(),
        }
    }

    async fn finish_login(&self, user_id: UserId, username: String, password: String) -> String {
        let login = username.clone();
        let result = SchoolsClient::scoped(self.config.clone(), move |client| {
            Box::pin(async move { client.authenticate(&login, &password).await })
        })
        .await;

        match result {
            Ok(outcome) if outcome.is_success() => {
                let reply = render::auth_outcome(&username, &outcome);
                let session = UserSession {
                    username,
                    authenticated: true,
                    auth: outcome,
                };
                if self.sessions.lock().await.insert(user_id, session) {
                    format!("{reply}\n\nТеперь вы можете использовать все функции бота: /help")
                } else {
                    ALREADY_LOGGED_IN_TEXT.to_string()
                }
            }
            Ok(outcome) => render::auth_outcome(&username, &outcome),
            Err(e) => {
                tracing::warn!(user_id, "login failed: {e}");
                format!(
                    "❌ Ошибка входа: {e}\n\nПроверьте правильность логина и пароля.\nПопробуйте снова: /login"
                )
            }
        }
    }

    async fn data(&self, user_id: UserId, request: DataRequest) -> String {
        if !self.is_logged_in(user_id).await {
            return format!(
                "🔐 Для просмотра {} необходимо войти в систему.\nИспользуйте команду /login",
                request.subject()
            );
        }

        let result = SchoolsClient::scoped(self.config.clone(), move |client| {
            Box::pin(request.fetch(client))
        })
        .await;

        match result {
            Ok(envelope) => render::envelope(request.heading(), &envelope),
            Err(e) => {
                tracing::warn!(user_id, ?request, "data request failed: {e}");
                format!("❌ Ошибка при получении {}: {e}", request.subject())
            }
        }
    }

    async fn search(&self, query: &str) -> String {
        if query.is_empty() {
            return "Использование: /search <запрос>".to_string();
        }
        let owned = query.to_string();
        let result = SchoolsClient::scoped(self.config.clone(), move |client| {
            Box::pin(async move { Ok(client.search_schools(&owned).await) })
        })
        .await;

        match result {
            Ok(found) => render::links(&format!("🔍 Школы по запросу «{query}»"), &found),
            Err(e) => format!("❌ Ошибка поиска: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("/start"), Some(("start".to_string(), "")));
        assert_eq!(
            split_command("/search@schools_bot  Минск "),
            Some(("search".to_string(), "Минск"))
        );
        assert_eq!(split_command("hello"), None);
    }

    #[test]
    fn test_parse_data_requests() {
        let date = NaiveDate::from_ymd_opt(2024, 9, 2);
        assert_eq!(
            DataRequest::parse("schedule", "2024-09-02"),
            Some(Ok(DataRequest::Schedule(date)))
        );
        assert_eq!(
            DataRequest::parse("homework", "02.09.2024"),
            Some(Ok(DataRequest::Homework(date)))
        );
        assert_eq!(
            DataRequest::parse("grades", "Semester"),
            Some(Ok(DataRequest::Grades(Some(GradePeriod::Semester))))
        );
        assert!(matches!(DataRequest::parse("grades", "week"), Some(Err(_))));
        assert!(matches!(DataRequest::parse("schedule", "tomorrow"), Some(Err(_))));
        assert_eq!(DataRequest::parse("login", ""), None);
    }

    #[tokio::test]
    async fn test_data_commands_require_login() {
        let chat = ChatFrontEnd::new(PortalConfig::default());
        let reply = chat.handle(1, "/grades").await;
        assert!(reply.contains("необходимо войти в систему"));
    }

    #[tokio::test]
    async fn test_login_conversation_and_cancel() {
        let chat = ChatFrontEnd::new(PortalConfig::default());
        assert_eq!(chat.handle(1, "/login").await, ASK_USERNAME_TEXT);
        assert!(chat.awaiting_input(1).await);

        let reply = chat.handle(1, "ivan").await;
        assert!(reply.starts_with("Логин принят: ivan"));
        assert!(chat.awaiting_password(1).await);

        assert_eq!(chat.handle(1, "/cancel").await, CANCELLED_TEXT);
        assert!(!chat.awaiting_input(1).await);
        assert_eq!(chat.handle(1, "/cancel").await, NOTHING_TO_CANCEL_TEXT);
    }

    #[tokio::test]
    async fn test_unknown_command_and_plain_text() {
        let chat = ChatFrontEnd::new(PortalConfig::default());
        assert_eq!(chat.handle(1, "/frobnicate").await, UNKNOWN_TEXT);
        assert_eq!(chat.handle(1, "привет").await, PLAIN_TEXT_HINT);
        assert_eq!(chat.handle(1, "/logout").await, NOT_LOGGED_IN_TEXT);
    }
}

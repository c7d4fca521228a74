//! The application flow: form input, generation, the subscription gate, reading and
//! the saved-story library.
//!
//! Each asynchronous step is split into a `begin`/`finish` pair of synchronous
//! transitions so a front-end can render the pending state while the call runs.
//! [`StoryWorkflow::generate`], [`StoryWorkflow::retry_generation`] and
//! [`StoryWorkflow::check_subscription`] drive the whole step in one call.

use anyhow::{Context, Result};
use chrono::Local;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::config::Config;
use crate::core::error::{GenerationError, SubscriptionError, ValidationError, NOT_SUBSCRIBED_MESSAGE};
use crate::core::state::{SavedStory, Library};
use crate::core::story::{GeneratedStory, StoryParams, Storybook};
use crate::services::generator::{generate_with_retry, RetryPolicy, StoryGenerator};
use crate::services::host::HostShell;
use crate::services::library::LibraryStore;
use crate::services::subscription::SubscriptionChecker;
use crate::utils::time::sleep;

pub const SAVE_FAILED_MESSAGE: &str =
    "Сказку не удалось сохранить на полку, но её можно прочитать прямо сейчас.";
pub const FLAG_SAVE_FAILED_MESSAGE: &str =
    "Подписка подтверждена, но не сохранилась. В следующий раз проверку, возможно, придётся повторить.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Input,
    Generating,
    Locked,
    Unlocking,
    Reading,
    Error,
    Library,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot {action} while in {state:?}")]
    InvalidTransition { state: AppState, action: &'static str },
    #[error("a subscription check is already running")]
    CheckInProgress,
    #[error("no saved story with id {0}")]
    UnknownStory(String),
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Channel the reader has to follow.
    pub channel: String,
    pub retry: RetryPolicy,
    pub unlock_delay: Duration,
}

impl WorkflowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel: config.telegram.channel.clone(),
            retry: RetryPolicy::from_config(config),
            unlock_delay: Duration::from_millis(config.unlock_delay_ms),
        }
    }
}

pub struct StoryWorkflow {
    state: AppState,
    store: LibraryStore,
    library: Library,
    subscribed: bool,
    params: Option<StoryParams>,
    book: Option<Storybook>,
    error: Option<String>,
    notice: Option<String>,
    checking: bool,
    generator: Arc<dyn StoryGenerator>,
    checker: Arc<dyn SubscriptionChecker>,
    host: Arc<dyn HostShell>,
    settings: WorkflowSettings,
}

impl StoryWorkflow {
    pub fn new(
        store: LibraryStore,
        generator: Arc<dyn StoryGenerator>,
        checker: Arc<dyn SubscriptionChecker>,
        host: Arc<dyn HostShell>,
        settings: WorkflowSettings,
    ) -> Result<Self> {
        let library = store.load_library().context("Failed to load the story library")?;
        let subscribed = store
            .load_subscribed()
            .context("Failed to load the subscription flag")?;
        info!(
            "Loaded {} saved stories (subscribed: {})",
            library.len(),
            subscribed
        );

        host.ready();
        host.expand();

        Ok(Self {
            state: AppState::Input,
            store,
            library,
            subscribed,
            params: None,
            book: None,
            error: None,
            notice: None,
            checking: false,
            generator,
            checker,
            host,
            settings,
        })
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn library(&self) -> &[SavedStory] {
        &self.library
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Parameters of the last submission, kept while a retry is possible.
    pub fn params(&self) -> Option<&StoryParams> {
        self.params.as_ref()
    }

    /// The story being read, or waiting behind the lock.
    pub fn book(&self) -> Option<&Storybook> {
        self.book.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Non-fatal message for the current screen.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_checking(&self) -> bool {
        self.checking
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn generator(&self) -> Arc<dyn StoryGenerator> {
        self.generator.clone()
    }

    pub fn checker(&self) -> Arc<dyn SubscriptionChecker> {
        self.checker.clone()
    }

    fn expect_state(&self, expected: AppState, action: &'static str) -> Result<(), WorkflowError> {
        if self.state != expected {
            return Err(WorkflowError::InvalidTransition { state: self.state, action });
        }
        Ok(())
    }

    // --- Generation ---

    /// Input -> Generating. Returns the request to send.
    pub fn submit(&mut self, params: StoryParams) -> Result<StoryParams, WorkflowError> {
        self.expect_state(AppState::Input, "submit")?;
        params.validate()?;

        self.params = Some(params.clone());
        self.error = None;
        self.notice = None;
        self.state = AppState::Generating;
        Ok(params)
    }

    /// Error -> Generating with the stored parameters.
    pub fn retry(&mut self) -> Result<StoryParams, WorkflowError> {
        self.expect_state(AppState::Error, "retry")?;
        let params = self.params.clone().ok_or(WorkflowError::InvalidTransition {
            state: self.state,
            action: "retry without parameters",
        })?;

        self.error = None;
        self.state = AppState::Generating;
        Ok(params)
    }

    /// Generating -> Locked | Reading | Error.
    pub fn finish_generation(
        &mut self,
        result: Result<GeneratedStory, GenerationError>,
    ) -> Result<AppState, WorkflowError> {
        self.expect_state(AppState::Generating, "finish a generation")?;

        match result {
            Ok(story) => {
                let hero = self.params.as_ref().map(|p| p.hero.clone()).unwrap_or_default();
                let saved = SavedStory::from_generated(&story, &hero, Local::now(), &self.library);
                info!("Saving story {} ({})", saved.id, saved.title);
                self.library.push(saved);
                if let Err(e) = self.store.save_library(&self.library) {
                    error!("Failed to persist the library: {:#}", e);
                    self.notice = Some(SAVE_FAILED_MESSAGE.to_string());
                }

                // Another session may have unlocked in the meantime.
                let stored = self.store.load_subscribed().unwrap_or_else(|e| {
                    warn!("Failed to re-read the subscription flag: {:#}", e);
                    false
                });
                self.subscribed = self.subscribed || stored;

                self.book = Some(Storybook::new(&story.title, &story.content));
                self.state = if self.subscribed {
                    AppState::Reading
                } else {
                    AppState::Locked
                };
            }
            Err(e) => {
                error!("Story generation failed: {}", e);
                self.error = Some(e.user_message());
                self.state = AppState::Error;
            }
        }
        Ok(self.state)
    }

    /// Error | Reading -> Input.
    pub fn reset(&mut self) -> Result<(), WorkflowError> {
        if !matches!(self.state, AppState::Error | AppState::Reading) {
            return Err(WorkflowError::InvalidTransition { state: self.state, action: "reset" });
        }
        self.params = None;
        self.book = None;
        self.error = None;
        self.notice = None;
        self.state = AppState::Input;
        Ok(())
    }

    pub async fn generate(&mut self, params: StoryParams) -> Result<AppState, WorkflowError> {
        let request = self.submit(params)?;
        self.run_generation(request).await
    }

    pub async fn retry_generation(&mut self) -> Result<AppState, WorkflowError> {
        let request = self.retry()?;
        self.run_generation(request).await
    }

    async fn run_generation(&mut self, request: StoryParams) -> Result<AppState, WorkflowError> {
        let result =
            generate_with_retry(self.generator.as_ref(), &request, self.settings.retry).await;
        self.finish_generation(result)
    }

    // --- Subscription gate ---

    /// Starts a check from Locked; returns the host's user id, if any.
    pub fn begin_unlock(&mut self) -> Result<Option<String>, WorkflowError> {
        self.expect_state(AppState::Locked, "check the subscription")?;
        if self.checking {
            return Err(WorkflowError::CheckInProgress);
        }
        self.checking = true;
        self.notice = None;
        Ok(self.host.user_id())
    }

    /// A positive verdict moves Locked -> Unlocking; anything else stays Locked.
    pub fn finish_unlock_check(
        &mut self,
        result: Result<bool, SubscriptionError>,
    ) -> Result<AppState, WorkflowError> {
        self.expect_state(AppState::Locked, "finish a subscription check")?;
        self.checking = false;

        match result {
            Ok(true) => {
                info!("Subscription confirmed");
                self.subscribed = true;
                if let Err(e) = self.store.save_subscribed(true) {
                    error!("Failed to persist the subscription flag: {:#}", e);
                    self.notice = Some(FLAG_SAVE_FAILED_MESSAGE.to_string());
                }
                self.state = AppState::Unlocking;
            }
            Ok(false) => {
                info!("User is not subscribed to {}", self.settings.channel);
                self.notice = Some(NOT_SUBSCRIBED_MESSAGE.to_string());
            }
            Err(e) => {
                warn!("Subscription check failed: {}", e);
                self.notice = Some(e.user_message());
            }
        }
        Ok(self.state)
    }

    /// Unlocking -> Reading.
    pub fn complete_unlock(&mut self) -> Result<AppState, WorkflowError> {
        self.expect_state(AppState::Unlocking, "complete the unlock")?;
        self.state = AppState::Reading;
        Ok(self.state)
    }

    pub async fn check_subscription(&mut self) -> Result<AppState, WorkflowError> {
        let user_id = self.begin_unlock()?;
        let result = match user_id {
            Some(id) => self.checker.is_subscribed(&id, &self.settings.channel).await,
            None => Err(SubscriptionError::Indeterminate(
                "host did not provide a user id".into(),
            )),
        };

        if self.finish_unlock_check(result)? == AppState::Unlocking {
            sleep(self.settings.unlock_delay).await;
            return self.complete_unlock();
        }
        Ok(self.state)
    }

    // --- Library ---

    pub fn open_library(&mut self) -> Result<(), WorkflowError> {
        self.expect_state(AppState::Input, "open the library")?;
        self.state = AppState::Library;
        Ok(())
    }

    /// Library -> Reading. Saved stories are never behind the lock.
    pub fn select(&mut self, id: &str) -> Result<(), WorkflowError> {
        self.expect_state(AppState::Library, "select a story")?;
        let story = self
            .library
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| WorkflowError::UnknownStory(id.to_string()))?;

        self.book = Some(Storybook::new(&story.title, &story.content));
        self.state = AppState::Reading;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), WorkflowError> {
        self.expect_state(AppState::Library, "leave the library")?;
        self.state = AppState::Input;
        Ok(())
    }

    // --- Reading ---

    pub fn next_page(&mut self) -> bool {
        self.state == AppState::Reading && self.book.as_mut().map_or(false, Storybook::next_page)
    }

    pub fn previous_page(&mut self) -> bool {
        self.state == AppState::Reading
            && self.book.as_mut().map_or(false, Storybook::previous_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{INDETERMINATE_MESSAGE, RATE_LIMITED_MESSAGE};
    use crate::core::io::{MemoryStorage, Storage};
    use crate::core::story::CUSTOM_TOPIC;
    use crate::services::host::StandaloneHost;
    use crate::services::library::SUBSCRIBED_KEY;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockGenerator {
        replies: Mutex<VecDeque<Result<GeneratedStory, GenerationError>>>,
        requests: Arc<Mutex<Vec<StoryParams>>>,
    }

    impl MockGenerator {
        fn new(replies: Vec<Result<GeneratedStory, GenerationError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl StoryGenerator for MockGenerator {
        async fn generate(&self, params: &StoryParams) -> Result<GeneratedStory, GenerationError> {
            self.requests.lock().unwrap().push(params.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(story()))
        }
    }

    struct MockChecker {
        verdicts: Mutex<VecDeque<Result<bool, SubscriptionError>>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockChecker {
        fn new(verdicts: Vec<Result<bool, SubscriptionError>>) -> Self {
            Self {
                verdicts: Mutex::new(verdicts.into()),
                call_count: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl SubscriptionChecker for MockChecker {
        async fn is_subscribed(&self, _user_id: &str, _channel: &str) -> Result<bool, SubscriptionError> {
            *self.call_count.lock().unwrap() += 1;
            self.verdicts.lock().unwrap().pop_front().unwrap_or(Ok(false))
        }
    }

    struct CountingHost {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl HostShell for CountingHost {
        fn user_id(&self) -> Option<String> {
            Some("42".to_string())
        }
        fn ready(&self) {
            self.calls.lock().unwrap().push("ready");
        }
        fn expand(&self) {
            self.calls.lock().unwrap().push("expand");
        }
    }

    fn story() -> GeneratedStory {
        GeneratedStory {
            title: "Щедрый Зайчик".to_string(),
            content: "Жил-был Зайчик.\n\nОн научился делиться.\nИ все были рады.".to_string(),
        }
    }

    fn anya() -> StoryParams {
        StoryParams::new("Аня", "Зайчик", "Делиться игрушками")
    }

    fn settings() -> WorkflowSettings {
        WorkflowSettings {
            channel: "@groupaifaily".to_string(),
            retry: RetryPolicy { max_retries: 1, cooldown: Duration::ZERO },
            unlock_delay: Duration::ZERO,
        }
    }

    struct Fixture {
        storage: Arc<MemoryStorage>,
        requests: Arc<Mutex<Vec<StoryParams>>>,
        checks: Arc<Mutex<usize>>,
    }

    fn workflow_with(
        replies: Vec<Result<GeneratedStory, GenerationError>>,
        verdicts: Vec<Result<bool, SubscriptionError>>,
        host: Arc<dyn HostShell>,
        storage: Arc<MemoryStorage>,
    ) -> (StoryWorkflow, Fixture) {
        let generator = MockGenerator::new(replies);
        let checker = MockChecker::new(verdicts);
        let fixture = Fixture {
            storage: storage.clone(),
            requests: generator.requests.clone(),
            checks: checker.call_count.clone(),
        };
        let workflow = StoryWorkflow::new(
            LibraryStore::new(storage),
            Arc::new(generator),
            Arc::new(checker),
            host,
            settings(),
        )
        .unwrap();
        (workflow, fixture)
    }

    fn workflow(
        replies: Vec<Result<GeneratedStory, GenerationError>>,
        verdicts: Vec<Result<bool, SubscriptionError>>,
    ) -> (StoryWorkflow, Fixture) {
        workflow_with(
            replies,
            verdicts,
            Arc::new(StandaloneHost::new(Some("42".to_string()))),
            Arc::new(MemoryStorage::new()),
        )
    }

    #[tokio::test]
    async fn test_generation_then_unlock_scenario() {
        let (mut wf, fx) = workflow(vec![Ok(story())], vec![Ok(true)]);
        assert_eq!(wf.state(), AppState::Input);

        let state = wf.generate(anya()).await.unwrap();
        assert_eq!(state, AppState::Locked);
        assert_eq!(wf.library().len(), 1);
        assert_eq!(wf.library()[0].hero, "Зайчик");
        assert!(!wf.is_subscribed());

        let state = wf.check_subscription().await.unwrap();
        assert_eq!(state, AppState::Reading);
        assert!(wf.is_subscribed());
        assert_eq!(fx.storage.read(SUBSCRIBED_KEY).unwrap().as_deref(), Some("true"));

        let book = wf.book().unwrap();
        assert_eq!(book.content(), story().content);
        assert_eq!(book.title(), "Щедрый Зайчик");
    }

    #[tokio::test]
    async fn test_story_is_persisted_before_lock_decision() {
        let storage = Arc::new(MemoryStorage::new());
        let (mut wf, _fx) = workflow_with(
            vec![Ok(story())],
            vec![],
            Arc::new(StandaloneHost::default()),
            storage.clone(),
        );
        wf.generate(anya()).await.unwrap();
        assert_eq!(wf.state(), AppState::Locked);

        let store = LibraryStore::new(storage);
        let saved = store.load_library().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].content, story().content);
    }

    #[tokio::test]
    async fn test_empty_custom_topic_is_rejected_locally() {
        let (mut wf, fx) = workflow(vec![], vec![]);
        let err = wf
            .generate(StoryParams::new("Аня", "Зайчик", CUSTOM_TOPIC).with_custom_topic(""))
            .await
            .unwrap_err();

        assert_eq!(err, WorkflowError::Validation(ValidationError::MissingCustomTopic));
        assert_eq!(wf.state(), AppState::Input);
        assert!(fx.requests.lock().unwrap().is_empty(), "no network call expected");
        assert!(wf.library().is_empty());
    }

    #[tokio::test]
    async fn test_double_rate_limit_ends_in_error_with_params_kept() {
        let (mut wf, fx) = workflow(
            vec![
                Err(GenerationError::RateLimited("429".into())),
                Err(GenerationError::RateLimited("429".into())),
                Ok(story()),
            ],
            vec![],
        );

        let state = wf.generate(anya()).await.unwrap();
        assert_eq!(state, AppState::Error);
        assert_eq!(wf.error_message(), Some(RATE_LIMITED_MESSAGE));
        assert_eq!(wf.params(), Some(&anya()));
        assert_eq!(fx.requests.lock().unwrap().len(), 2);
        assert!(wf.library().is_empty());

        let state = wf.retry_generation().await.unwrap();
        assert_eq!(state, AppState::Locked);
        let requests = fx.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2], requests[0]);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_reaches_locked() {
        let (mut wf, _fx) = workflow(
            vec![Err(GenerationError::RateLimited("429".into())), Ok(story())],
            vec![],
        );
        assert_eq!(wf.generate(anya()).await.unwrap(), AppState::Locked);
        assert_eq!(wf.library().len(), 1);
    }

    #[tokio::test]
    async fn test_error_reset_discards_params() {
        let (mut wf, _fx) = workflow(
            vec![Err(GenerationError::UpstreamUnavailable("503".into()))],
            vec![],
        );
        assert_eq!(wf.generate(anya()).await.unwrap(), AppState::Error);
        assert!(wf.error_message().unwrap().contains("503"));

        wf.reset().unwrap();
        assert_eq!(wf.state(), AppState::Input);
        assert!(wf.params().is_none());
        assert!(wf.error_message().is_none());
        assert!(matches!(
            wf.retry(),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscribed_flag_skips_lock() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(SUBSCRIBED_KEY, "true").unwrap();
        let (mut wf, fx) = workflow_with(
            vec![Ok(story())],
            vec![],
            Arc::new(StandaloneHost::default()),
            storage,
        );

        assert_eq!(wf.generate(anya()).await.unwrap(), AppState::Reading);
        assert_eq!(*fx.checks.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flag_written_elsewhere_is_seen_at_decision_time() {
        let (mut wf, fx) = workflow(vec![Ok(story())], vec![]);
        assert!(!wf.is_subscribed());

        fx.storage.write(SUBSCRIBED_KEY, "true").unwrap();
        assert_eq!(wf.generate(anya()).await.unwrap(), AppState::Reading);
        assert!(wf.is_subscribed());
    }

    #[tokio::test]
    async fn test_unlock_stays_for_later_generations() {
        let (mut wf, fx) = workflow(vec![Ok(story()), Ok(story())], vec![Ok(true)]);
        wf.generate(anya()).await.unwrap();
        wf.check_subscription().await.unwrap();
        wf.reset().unwrap();

        assert_eq!(wf.generate(anya()).await.unwrap(), AppState::Reading);
        assert_eq!(wf.library().len(), 2);
        assert_eq!(*fx.checks.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_verdict_keeps_lock_with_notice() {
        let (mut wf, _fx) = workflow(vec![Ok(story())], vec![Ok(false), Ok(true)]);
        wf.generate(anya()).await.unwrap();

        assert_eq!(wf.check_subscription().await.unwrap(), AppState::Locked);
        assert_eq!(wf.notice(), Some(NOT_SUBSCRIBED_MESSAGE));
        assert!(!wf.is_subscribed());
        assert!(!wf.is_checking());

        assert_eq!(wf.check_subscription().await.unwrap(), AppState::Reading);
        assert!(wf.notice().is_none());
    }

    #[tokio::test]
    async fn test_missing_user_id_is_indeterminate() {
        let (mut wf, fx) = workflow_with(
            vec![Ok(story())],
            vec![Ok(true)],
            Arc::new(StandaloneHost::default()),
            Arc::new(MemoryStorage::new()),
        );
        wf.generate(anya()).await.unwrap();

        assert_eq!(wf.check_subscription().await.unwrap(), AppState::Locked);
        assert_eq!(wf.notice(), Some(INDETERMINATE_MESSAGE));
        assert_ne!(wf.notice(), Some(NOT_SUBSCRIBED_MESSAGE));
        assert_eq!(*fx.checks.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_checker_error_keeps_lock() {
        let (mut wf, _fx) = workflow(
            vec![Ok(story())],
            vec![Err(SubscriptionError::VerificationFailed("chat not found".into()))],
        );
        wf.generate(anya()).await.unwrap();

        assert_eq!(wf.check_subscription().await.unwrap(), AppState::Locked);
        assert!(wf.notice().unwrap().contains("chat not found"));
        assert_eq!(wf.library().len(), 1);
    }

    #[test]
    fn test_single_check_in_flight() {
        let (mut wf, _fx) = workflow(vec![], vec![]);
        wf.submit(anya()).unwrap();
        wf.finish_generation(Ok(story())).unwrap();

        assert_eq!(wf.begin_unlock().unwrap().as_deref(), Some("42"));
        assert_eq!(wf.begin_unlock(), Err(WorkflowError::CheckInProgress));

        assert_eq!(wf.finish_unlock_check(Ok(true)).unwrap(), AppState::Unlocking);
        assert_eq!(wf.complete_unlock().unwrap(), AppState::Reading);
    }

    #[test]
    fn test_no_resubmission_while_generating() {
        let (mut wf, _fx) = workflow(vec![], vec![]);
        wf.submit(anya()).unwrap();
        assert_eq!(
            wf.submit(anya()),
            Err(WorkflowError::InvalidTransition { state: AppState::Generating, action: "submit" })
        );
        assert!(matches!(wf.open_library(), Err(WorkflowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_library_selection_is_never_locked() {
        let (mut wf, fx) = workflow(vec![Ok(story())], vec![]);
        wf.generate(anya()).await.unwrap();
        assert_eq!(wf.state(), AppState::Locked);
        assert!(!wf.is_subscribed());

        // A new session over the same store, still unsubscribed.
        let (mut wf, _fx) = workflow_with(
            vec![],
            vec![],
            Arc::new(StandaloneHost::default()),
            fx.storage.clone(),
        );
        wf.open_library().unwrap();
        assert_eq!(wf.state(), AppState::Library);

        let id = wf.library()[0].id.clone();
        wf.select(&id).unwrap();
        assert_eq!(wf.state(), AppState::Reading);
        assert!(!wf.is_subscribed());
        assert_eq!(wf.book().unwrap().content(), story().content);

        wf.reset().unwrap();
        assert_eq!(wf.library().len(), 1);
    }

    #[test]
    fn test_library_navigation() {
        let (mut wf, _fx) = workflow(vec![], vec![]);
        wf.open_library().unwrap();
        assert_eq!(wf.select("missing"), Err(WorkflowError::UnknownStory("missing".into())));
        assert_eq!(wf.state(), AppState::Library);

        wf.back().unwrap();
        assert_eq!(wf.state(), AppState::Input);
        assert!(wf.back().is_err());
    }

    #[test]
    fn test_paging_only_while_reading() {
        let (mut wf, _fx) = workflow(vec![], vec![]);
        assert!(!wf.next_page());

        wf.submit(anya()).unwrap();
        wf.finish_generation(Ok(story())).unwrap();
        assert_eq!(wf.state(), AppState::Locked);
        assert!(!wf.next_page(), "locked stories cannot be paged");

        wf.begin_unlock().unwrap();
        wf.finish_unlock_check(Ok(true)).unwrap();
        wf.complete_unlock().unwrap();

        assert_eq!(wf.book().unwrap().page_count(), 2);
        assert!(wf.next_page());
        assert!(!wf.next_page());
        assert!(wf.previous_page());
    }

    #[test]
    fn test_host_is_readied_and_expanded_on_start() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let host = Arc::new(CountingHost { calls: calls.clone() });
        let _ = workflow_with(vec![], vec![], host, Arc::new(MemoryStorage::new()));
        assert_eq!(*calls.lock().unwrap(), vec!["ready", "expand"]);
    }

    #[test]
    fn test_corrupt_store_fails_startup() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(SUBSCRIBED_KEY, "maybe").unwrap();
        let result = StoryWorkflow::new(
            LibraryStore::new(storage),
            Arc::new(MockGenerator::new(vec![])),
            Arc::new(MockChecker::new(vec![])),
            Arc::new(StandaloneHost::default()),
            settings(),
        );
        assert!(result.is_err());
    }

    struct ReadOnlyStorage;

    impl Storage for ReadOnlyStorage {
        fn read(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk full while writing {}", key)
        }
    }

    fn read_only_workflow(verdicts: Vec<Result<bool, SubscriptionError>>) -> StoryWorkflow {
        StoryWorkflow::new(
            LibraryStore::new(Arc::new(ReadOnlyStorage)),
            Arc::new(MockGenerator::new(vec![])),
            Arc::new(MockChecker::new(verdicts)),
            Arc::new(StandaloneHost::new(Some("42".to_string()))),
            settings(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unsaved_story_is_kept_with_notice() {
        let mut wf = read_only_workflow(vec![]);

        let state = wf.generate(anya()).await.unwrap();

        assert_eq!(state, AppState::Locked);
        assert_eq!(wf.library().len(), 1);
        assert_eq!(wf.notice(), Some(SAVE_FAILED_MESSAGE));
        assert!(wf.book().is_some());
    }

    #[tokio::test]
    async fn test_unsaved_subscription_flag_is_reported_after_unlock() {
        let mut wf = read_only_workflow(vec![Ok(true)]);
        wf.generate(anya()).await.unwrap();

        let state = wf.check_subscription().await.unwrap();

        assert_eq!(state, AppState::Reading);
        assert!(wf.is_subscribed());
        assert_eq!(wf.notice(), Some(FLAG_SAVE_FAILED_MESSAGE));
    }
}

//! Interactive terminal front-end driving [`StoryWorkflow`].

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{InquireError, Select, Text};
use std::time::Duration;

use crate::core::story::{StoryParams, CUSTOM_TOPIC, TOPICS};
use crate::services::generator::generate_with_retry;
use crate::services::workflow::{AppState, StoryWorkflow, WorkflowError};

const NEW_STORY: &str = "Новая сказка";
const LIBRARY: &str = "Моя полка";
const QUIT: &str = "Выход";
const CHECK: &str = "Я подписался";
const RETRY: &str = "Повторить";
const START_OVER: &str = "В начало";
const NEXT: &str = "Дальше";
const PREVIOUS: &str = "Назад";
const ANOTHER: &str = "Создать новую";
const BACK: &str = "← Назад";

/// `None` when the user cancels the prompt (Esc / Ctrl-C).
fn cancelled<T>(result: Result<T, InquireError>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn choose(prompt: &str, options: Vec<&'static str>) -> Result<Option<&'static str>> {
    cancelled(Select::new(prompt, options).prompt())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.yellow} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn ask_params() -> Result<Option<StoryParams>> {
    let Some(name) = cancelled(Text::new("Как зовут ребёнка?").prompt())? else {
        return Ok(None);
    };
    let Some(hero) = cancelled(Text::new("Кто будет главным героем?").prompt())? else {
        return Ok(None);
    };
    let Some(topic) = choose("Чему научит сказка?", TOPICS.to_vec())? else {
        return Ok(None);
    };

    let mut params = StoryParams::new(&name, &hero, topic);
    if topic == CUSTOM_TOPIC {
        let Some(custom) = cancelled(Text::new("Свой вариант:").prompt())? else {
            return Ok(None);
        };
        params = params.with_custom_topic(&custom);
    }
    Ok(Some(params))
}

/// Remembers the last notice shown so page turns do not repeat it.
#[derive(Debug, Default)]
struct NoticeBoard {
    shown: Option<(AppState, String)>,
}

impl NoticeBoard {
    /// Returns the notice when it was not yet shown in this state.
    fn fresh(&mut self, state: AppState, notice: Option<&str>) -> Option<String> {
        let Some(notice) = notice else {
            self.shown = None;
            return None;
        };
        if self
            .shown
            .as_ref()
            .is_some_and(|(s, n)| *s == state && n == notice)
        {
            return None;
        }
        self.shown = Some((state, notice.to_string()));
        Some(notice.to_string())
    }

    /// Forgets the last notice; a repeated verdict is shown again.
    fn clear(&mut self) {
        self.shown = None;
    }
}

fn form_hint(err: &WorkflowError) -> &'static str {
    match err {
        WorkflowError::Validation(crate::core::error::ValidationError::MissingName) => {
            "Введите имя ребёнка."
        }
        WorkflowError::Validation(crate::core::error::ValidationError::MissingHero) => {
            "Придумайте главного героя."
        }
        WorkflowError::Validation(crate::core::error::ValidationError::MissingCustomTopic) => {
            "Опишите свой вариант сюжета."
        }
        _ => "Сейчас это сделать нельзя.",
    }
}

async fn generate(workflow: &mut StoryWorkflow, request: StoryParams) -> Result<()> {
    let pb = spinner("Сочиняем сказку...")?;
    let generator = workflow.generator();
    let policy = workflow.settings().retry;
    let result = generate_with_retry(generator.as_ref(), &request, policy).await;
    pb.finish_and_clear();
    workflow.finish_generation(result)?;
    Ok(())
}

fn print_page(workflow: &StoryWorkflow) {
    let Some(book) = workflow.book() else { return };
    println!();
    println!("  ★ {} ★", book.title());
    println!();
    for paragraph in book.current_page() {
        println!("  {}", paragraph);
        println!();
    }
    if book.is_last_page() {
        println!("  — Конец —");
    }
    println!("  стр. {}/{}", book.page_index() + 1, book.page_count());
}

pub async fn run(workflow: &mut StoryWorkflow, channel_link: &str) -> Result<()> {
    let mut notices = NoticeBoard::default();
    loop {
        if let Some(notice) = notices.fresh(workflow.state(), workflow.notice()) {
            println!("{}", notice);
        }

        match workflow.state() {
            AppState::Input => match choose("Что будем делать?", vec![NEW_STORY, LIBRARY, QUIT])? {
                Some(NEW_STORY) => {
                    let Some(params) = ask_params()? else { continue };
                    match workflow.submit(params) {
                        Ok(request) => generate(workflow, request).await?,
                        Err(e) => println!("{}", form_hint(&e)),
                    }
                }
                Some(LIBRARY) => workflow.open_library()?,
                _ => return Ok(()),
            },
            AppState::Locked => {
                println!("Сказка почти готова! Чтобы прочитать её, подпишитесь на канал: {}", channel_link);
                match choose("Подписались?", vec![CHECK, QUIT])? {
                    Some(CHECK) => {
                        let pb = spinner("Проверяем подписку...")?;
                        let result = workflow.check_subscription().await;
                        pb.finish_and_clear();
                        notices.clear();
                        result?;
                    }
                    _ => return Ok(()),
                }
            }
            AppState::Unlocking => {
                workflow.complete_unlock()?;
            }
            AppState::Reading => {
                print_page(workflow);
                let mut options = Vec::new();
                if workflow.book().is_some_and(|b| !b.is_last_page()) {
                    options.push(NEXT);
                }
                if workflow.book().is_some_and(|b| b.page_index() > 0) {
                    options.push(PREVIOUS);
                }
                options.push(ANOTHER);
                options.push(QUIT);

                match choose("Дальше?", options)? {
                    Some(NEXT) => {
                        workflow.next_page();
                    }
                    Some(PREVIOUS) => {
                        workflow.previous_page();
                    }
                    Some(ANOTHER) => workflow.reset()?,
                    _ => return Ok(()),
                }
            }
            AppState::Error => {
                println!("{}", workflow.error_message().unwrap_or("Что-то пошло не так."));
                match choose("Что дальше?", vec![RETRY, START_OVER, QUIT])? {
                    Some(RETRY) => {
                        let request = workflow.retry()?;
                        generate(workflow, request).await?;
                    }
                    Some(START_OVER) => workflow.reset()?,
                    _ => return Ok(()),
                }
            }
            AppState::Library => {
                if workflow.library().is_empty() {
                    println!("Полка пока пуста. Создайте свою первую сказку!");
                    workflow.back()?;
                    continue;
                }

                // Newest first.
                let stories: Vec<(String, String)> = workflow
                    .library()
                    .iter()
                    .rev()
                    .map(|s| {
                        (
                            s.id.clone(),
                            format!("{} — {} (про {})", s.title, s.date, s.hero),
                        )
                    })
                    .collect();
                let mut labels: Vec<String> = stories.iter().map(|(_, label)| label.clone()).collect();
                labels.push(BACK.to_string());

                match cancelled(Select::new("Моя полка", labels).raw_prompt())? {
                    Some(choice) if choice.index < stories.len() => {
                        workflow.select(&stories[choice.index].0)?;
                    }
                    _ => workflow.back()?,
                }
            }
            AppState::Generating => bail!("generation left unfinished"),
        }
    }
}

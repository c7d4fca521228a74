use leptos::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::SubscriptionError;
use crate::core::io::WebStorage;
use crate::core::story::{StoryParams, CUSTOM_TOPIC, TOPICS};
use crate::services::generator::{generate_with_retry, HttpStoryGenerator};
use crate::services::host::{HostShell, StandaloneHost, TelegramWebApp};
use crate::services::library::LibraryStore;
use crate::services::subscription::{HttpSubscriptionChecker, SubscriptionChecker};
use crate::services::workflow::{AppState, StoryWorkflow, WorkflowSettings};
use crate::utils::time::sleep;

type Shared = Rc<RefCell<StoryWorkflow>>;

fn origin() -> String {
    web_sys::window()
        .and_then(|w| w.location().origin().ok())
        .unwrap_or_default()
}

fn build_workflow(config: &Config) -> anyhow::Result<StoryWorkflow> {
    let base = origin();
    let storage = Arc::new(WebStorage::new()?);
    let host: Arc<dyn HostShell> = match TelegramWebApp::detect() {
        Some(app) => Arc::new(app),
        None => Arc::new(StandaloneHost::default()),
    };

    StoryWorkflow::new(
        LibraryStore::new(storage),
        Arc::new(HttpStoryGenerator::new(&format!("{}/api/generate", base))),
        Arc::new(HttpSubscriptionChecker::new(&format!("{}/api/check-subscription", base))),
        host,
        WorkflowSettings::from_config(config),
    )
}

#[component]
pub fn App() -> impl IntoView {
    let config = Config::default();
    let channel_link = config.telegram.channel_link.clone();

    view! {
        <div class="app-container">
            <h1>"Magic Tales"</h1>
            {match build_workflow(&config) {
                Ok(wf) => view! { <Tales workflow=Rc::new(RefCell::new(wf)) channel_link=channel_link/> }.into_view(),
                Err(e) => view! { <p>"Error loading storage: " {e.to_string()}</p> }.into_view(),
            }}
        </div>
    }
}

#[component]
fn Tales(workflow: Shared, channel_link: String) -> impl IntoView {
    let (version, set_version) = create_signal(0u32);
    let refresh = move || set_version.update(|v| *v += 1);

    let (name, set_name) = create_signal(String::new());
    let (hero, set_hero) = create_signal(String::new());
    let (topic, set_topic) = create_signal(TOPICS[0].to_string());
    let (custom, set_custom) = create_signal(String::new());
    let (form_error, set_form_error) = create_signal(None::<String>);

    let wf = workflow.clone();
    let run_generation = move |request: StoryParams| {
        let (generator, policy) = {
            let w = wf.borrow();
            (w.generator(), w.settings().retry)
        };
        let wf = wf.clone();
        spawn_local(async move {
            let result = generate_with_retry(generator.as_ref(), &request, policy).await;
            if let Err(e) = wf.borrow_mut().finish_generation(result) {
                log::warn!("Generation finished out of order: {}", e);
            }
            refresh();
        });
    };

    let wf = workflow.clone();
    let start = run_generation.clone();
    let on_submit = move |ev: leptos::ev::SubmitEvent| {
        ev.prevent_default();
        let mut params = StoryParams::new(&name.get(), &hero.get(), &topic.get());
        if params.is_custom() {
            params = params.with_custom_topic(&custom.get());
        }
        let submitted = wf.borrow_mut().submit(params);
        match submitted {
            Ok(request) => {
                set_form_error.set(None);
                refresh();
                start(request);
            }
            Err(e) => set_form_error.set(Some(e.to_string())),
        }
    };

    let wf = workflow.clone();
    let start = run_generation.clone();
    let on_retry = move |_: leptos::ev::MouseEvent| {
        let retried = wf.borrow_mut().retry();
        if let Ok(request) = retried {
            refresh();
            start(request);
        }
    };

    let wf = workflow.clone();
    let on_check = move |_: leptos::ev::MouseEvent| {
        let begun = wf.borrow_mut().begin_unlock();
        let Ok(user_id) = begun else { return };
        refresh();

        let (checker, channel, delay) = {
            let w = wf.borrow();
            (w.checker(), w.settings().channel.clone(), w.settings().unlock_delay)
        };
        let wf = wf.clone();
        spawn_local(async move {
            let result = match user_id {
                Some(id) => checker.is_subscribed(&id, &channel).await,
                None => Err(SubscriptionError::Indeterminate(
                    "host did not provide a user id".into(),
                )),
            };
            let state = wf.borrow_mut().finish_unlock_check(result);
            refresh();
            if state == Ok(AppState::Unlocking) {
                sleep(delay).await;
                let _ = wf.borrow_mut().complete_unlock();
                refresh();
            }
        });
    };

    let wf = workflow.clone();
    let on_reset = move |_: leptos::ev::MouseEvent| {
        let done = wf.borrow_mut().reset().is_ok();
        if done {
            refresh();
        }
    };

    let wf = workflow.clone();
    let on_library = move |_: leptos::ev::MouseEvent| {
        let done = wf.borrow_mut().open_library().is_ok();
        if done {
            refresh();
        }
    };

    let wf = workflow.clone();
    let on_back = move |_: leptos::ev::MouseEvent| {
        let done = wf.borrow_mut().back().is_ok();
        if done {
            refresh();
        }
    };

    let wf = workflow.clone();
    let on_next = move |_: leptos::ev::MouseEvent| {
        let moved = wf.borrow_mut().next_page();
        if moved {
            refresh();
        }
    };

    let wf = workflow.clone();
    let on_previous = move |_: leptos::ev::MouseEvent| {
        let moved = wf.borrow_mut().previous_page();
        if moved {
            refresh();
        }
    };

    let wf_select = workflow.clone();
    let wf_view = workflow.clone();
    move || {
        version.get();
        let w = wf_view.borrow();
        match w.state() {
            AppState::Input => view! {
                <form class="story-form" on:submit=on_submit.clone()>
                    <input type="text" placeholder="Имя ребёнка" prop:value=name
                        on:input=move |ev| set_name.set(event_target_value(&ev))/>
                    <input type="text" placeholder="Главный герой" prop:value=hero
                        on:input=move |ev| set_hero.set(event_target_value(&ev))/>
                    <select on:change=move |ev| set_topic.set(event_target_value(&ev))>
                        {TOPICS
                            .into_iter()
                            .map(|t| view! { <option value=t selected=move || topic.get() == t>{t}</option> })
                            .collect_view()}
                    </select>
                    {move || (topic.get() == CUSTOM_TOPIC).then(|| view! {
                        <input type="text" placeholder="Чему научит сказка?" prop:value=custom
                            on:input=move |ev| set_custom.set(event_target_value(&ev))/>
                    })}
                    {move || form_error.get().map(|e| view! { <p class="form-error">{e}</p> })}
                    <button type="submit">"Создать сказку"</button>
                </form>
                <button class="library-button" on:click=on_library.clone()>"Моя полка"</button>
            }
            .into_view(),
            AppState::Generating | AppState::Unlocking => view! {
                <div class="loading-overlay"><p>"Сочиняем волшебство..."</p></div>
            }
            .into_view(),
            AppState::Locked => view! {
                <div class="subscription-modal">
                    <h3>"Сказка почти готова!"</h3>
                    <p>"Чтобы прочитать волшебную историю, пожалуйста, подпишитесь на наш Telegram канал."</p>
                    <a href=channel_link.clone() target="_blank" rel="noopener noreferrer">"Подписаться на канал"</a>
                    <button on:click=on_check.clone() disabled=w.is_checking()>
                        {if w.is_checking() { "Проверяем подписку..." } else { "Я подписался" }}
                    </button>
                    {w.notice().map(|n| view! { <p class="notice">{n.to_string()}</p> })}
                </div>
            }
            .into_view(),
            AppState::Reading => match w.book().cloned() {
                Some(book) => view! {
                    <article class="storybook">
                        <h2>{book.title().to_string()}</h2>
                        {book.current_page().iter().map(|p| view! { <p>{p.clone()}</p> }).collect_view()}
                        {book.is_last_page().then(|| view! { <p class="the-end">"Конец"</p> })}
                        <p class="page-number">{format!("{} / {}", book.page_index() + 1, book.page_count())}</p>
                        <button on:click=on_previous.clone() disabled=book.page_index() == 0>"‹"</button>
                        <button on:click=on_next.clone() disabled=book.is_last_page()>"›"</button>
                        <button on:click=on_reset.clone()>"Создать новую"</button>
                        {w.notice().map(|n| view! { <p class="notice">{n.to_string()}</p> })}
                    </article>
                }
                .into_view(),
                None => ().into_view(),
            },
            AppState::Error => view! {
                <div class="error-box">
                    <p>{w.error_message().unwrap_or("Упс! Магия дала сбой.").to_string()}</p>
                    <button on:click=on_retry.clone()>"Попробовать снова"</button>
                    <button on:click=on_reset.clone()>"В начало"</button>
                </div>
            }
            .into_view(),
            AppState::Library => view! {
                <div class="library">
                    <button on:click=on_back.clone()>"‹"</button>
                    <h2>"Моя полка"</h2>
                    {if w.library().is_empty() {
                        view! { <p>"Полка пока пуста. Создайте свою первую сказку!"</p> }.into_view()
                    } else {
                        w.library()
                            .iter()
                            .rev()
                            .map(|s| {
                                let wf = wf_select.clone();
                                let id = s.id.clone();
                                view! {
                                    <div class="saved-story" on:click=move |_| {
                                        let selected = wf.borrow_mut().select(&id).is_ok();
                                        if selected {
                                            refresh();
                                        }
                                    }>
                                        <h3>{s.title.clone()}</h3>
                                        <span>{s.date.clone()}</span>
                                        <p>{format!("Про {}", s.hero)}</p>
                                        <p class="preview">{s.preview(100)}</p>
                                    </div>
                                }
                            })
                            .collect_view()
                    }}
                </div>
            }
            .into_view(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use magic_tales::core::config::Config;
    use magic_tales::core::io::NativeStorage;
    use magic_tales::services::generator::create_generator;
    use magic_tales::services::host::StandaloneHost;
    use magic_tales::services::library::LibraryStore;
    use magic_tales::services::subscription::create_checker;
    use magic_tales::services::workflow::{StoryWorkflow, WorkflowSettings};
    use std::sync::Arc;

    env_logger::init();

    // 1. Load Config
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please check 'config.yml' (delete it to regenerate the defaults).");
            return Err(e);
        }
    };

    // 2. Wire the collaborators
    let store = LibraryStore::new(Arc::new(NativeStorage::new(&config.storage_folder)));
    let generator = create_generator(&config);
    let checker = create_checker(&config);
    let host = Arc::new(StandaloneHost::new(config.telegram.user_id.clone()));

    // 3. Run
    let mut workflow = StoryWorkflow::new(
        store,
        generator,
        checker,
        host,
        WorkflowSettings::from_config(&config),
    )?;
    magic_tales::ui::terminal::run(&mut workflow, &config.telegram.channel_link).await?;

    println!("Спокойной ночи!");
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}

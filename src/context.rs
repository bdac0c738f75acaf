use crate::config::{self, AppPaths, Settings};
use crate::error::AppResult;
use crate::output::Output;
use crate::sender::GraphSender;

#[derive(Debug)]
pub struct AppContext {
    pub profile: String,
    pub paths: AppPaths,
    pub settings: Settings,
    pub output: Output,
}

impl AppContext {
    pub fn bootstrap(profile: String, json: bool) -> AppResult<Self> {
        let profile = config::resolve_profile(&profile)?;
        let paths = AppPaths::discover()?;
        let settings = config::load_settings(&paths, &profile)?;
        let output = Output::new(json);

        tracing::debug!(
            profile = %profile,
            settings_file = %paths.settings_file(&profile).display(),
            "profile loaded"
        );

        Ok(Self {
            profile,
            paths,
            settings,
            output,
        })
    }

    pub fn sender(&self, save_sent_items: Option<bool>) -> AppResult<GraphSender> {
        let mut settings = self.settings.clone();
        if let Some(save) = save_sent_items {
            settings.save_sent_items = Some(save);
        }

        GraphSender::from_settings(&settings)
    }
}

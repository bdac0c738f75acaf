use url::Url;

use crate::error::{AppError, AppResult};

const API_VERSION: &str = "v1.0";

pub fn send_mail_url(base_url: &str, sender: &str) -> AppResult<Url> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| AppError::Config(format!("invalid api base url: {base_url}")))?
        .pop_if_empty()
        .extend([API_VERSION, "users", sender, "sendMail"]);
    Ok(url)
}

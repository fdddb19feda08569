use std::sync::Arc;

use crate::config::Settings;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) settings: Arc<Settings>,
}

//! Transport-neutral views for exposing settings over HTTP, a CLI or any
//! other boundary. Handlers map [`Error::status_code`] to their own status.

mod views;

use crate::error::{Error, Result};
use crate::manager::SettingsManager;

pub use views::{
    ErrorBody, SectionView, SettingView, UpdateRequest, DEFAULT_SECTION, MASKED_VALUE,
};

/// All settings grouped by section, sections in order of first appearance.
/// Unsectioned fields are listed under [`DEFAULT_SECTION`].
pub fn list_sections(
    manager: &SettingsManager,
    role: &str,
    reveal: bool,
) -> Result<Vec<SectionView>> {
    let mut sections: Vec<SectionView> = Vec::new();

    for info in manager.get_settings_info()? {
        let section = info
            .section
            .clone()
            .unwrap_or_else(|| DEFAULT_SECTION.to_owned());
        let editable = manager.can_change(&info.name, role)?;
        let view = SettingView::from_info(info, editable, reveal);

        match sections.iter_mut().find(|entry| entry.name == section) {
            Some(entry) => entry.settings.push(view),
            None => sections.push(SectionView {
                name: section,
                settings: vec![view],
            }),
        }
    }

    Ok(sections)
}

pub fn setting_view(
    manager: &SettingsManager,
    name: &str,
    role: &str,
    reveal: bool,
) -> Result<SettingView> {
    let info = manager
        .get_settings_info()?
        .into_iter()
        .find(|info| info.name == name)
        .ok_or_else(|| Error::UnknownKey(name.to_owned()))?;
    let editable = manager.can_change(name, role)?;
    Ok(SettingView::from_info(info, editable, reveal))
}

/// Applies `request` and returns the resulting view, masked for the caller.
pub async fn apply_update(
    manager: &SettingsManager,
    name: &str,
    request: UpdateRequest,
    role: &str,
) -> Result<SettingView> {
    manager.update_setting(name, request.value, role).await?;
    setting_view(manager, name, role, false)
}

/// Parses a raw request body. The body must be `{"value": ...}` so an
/// `object` field can hold any object, including one with a `value` key.
pub fn parse_update(body: &str) -> Result<UpdateRequest> {
    serde_json::from_str(body).map_err(|err| {
        Error::Validation(format!(
            "request body must be an object with a 'value' field: {err}"
        ))
    })
}

use garde::Validate;
use kernel::model::settings::EmailSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettingsResponse {
    pub enabled: bool,
    pub from_address: String,
    pub redirect_to: Option<String>,
    pub cc_contact: bool,
}

impl From<EmailSettings> for EmailSettingsResponse {
    fn from(value: EmailSettings) -> Self {
        let EmailSettings {
            enabled,
            from_address,
            redirect_to,
            cc_contact,
        } = value;
        Self {
            enabled,
            from_address,
            redirect_to,
            cc_contact,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmailSettingsRequest {
    #[garde(skip)]
    pub enabled: bool,
    #[garde(email)]
    pub from_address: String,
    // 転送を止める場合は null を送る
    #[garde(email)]
    #[serde(default)]
    pub redirect_to: Option<String>,
    #[garde(skip)]
    pub cc_contact: bool,
}

impl From<UpdateEmailSettingsRequest> for EmailSettings {
    fn from(value: UpdateEmailSettingsRequest) -> Self {
        let UpdateEmailSettingsRequest {
            enabled,
            from_address,
            redirect_to,
            cc_contact,
        } = value;
        EmailSettings {
            enabled,
            from_address,
            redirect_to,
            cc_contact,
        }
    }
}

//! New-device approval flow.
//!
//! Unknown stations trigger a notification with Add / Ignore / Block
//! buttons. Add opens a VLAN selector (three buttons per row plus Back);
//! picking a VLAN registers the device, and the operator can reply to the
//! success message with a display name for it.

use super::{callback_data, BotError, View};
use crate::cache::TokenCache;
use crate::registry::{Device, Registry};
use crate::server::LoginAttempt;
use regex::Regex;
use std::sync::OnceLock;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

const ACTION_ADD: &str = "add";
const ACTION_SELECT_VLAN: &str = "select-vlan";
const ACTION_BACK: &str = "back-add";
const ACTION_IGNORE: &str = "ignore";
const ACTION_BLOCK: &str = "blocklist";

const CACHE_SIZE: usize = 100;
/// VLAN buttons per keyboard row.
const BUTTONS_PER_ROW: usize = 3;

/// State carried between the notification and its button callbacks.
#[derive(Debug, Clone)]
pub struct PendingDevice {
    pub username: String,
    pub password: String,
    /// Empty until the operator picks a VLAN.
    pub vlan_id: String,
    pub mac_address: String,
}

fn added_message_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+(.*?) has been added to the").expect("valid regex"))
}

pub struct NewDeviceFlow {
    cache: TokenCache<PendingDevice>,
}

impl Default for NewDeviceFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl NewDeviceFlow {
    pub fn new() -> Self {
        NewDeviceFlow {
            cache: TokenCache::new(CACHE_SIZE),
        }
    }

    /// The NOTIFY state: new-device alert with Add / Ignore / Block.
    pub fn notify_view(&self, attempt: &LoginAttempt) -> View {
        let pending = PendingDevice {
            username: attempt.username.clone(),
            password: attempt.password.clone(),
            vlan_id: String::new(),
            mac_address: attempt.mac_address.clone(),
        };
        self.render_notify(&pending)
    }

    fn render_notify(&self, pending: &PendingDevice) -> View {
        let token = self.cache.insert(pending.clone());

        let keyboard = InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::callback(
                "✅ Add Device",
                callback_data(ACTION_ADD, &token),
            )],
            vec![InlineKeyboardButton::callback(
                "❌ Ignore Request",
                callback_data(ACTION_IGNORE, &token),
            )],
            vec![InlineKeyboardButton::callback(
                "🔒 Block Device",
                callback_data(ACTION_BLOCK, &token),
            )],
        ]);

        let text = format!(
            "*🚨 New Device Detected! 🚨*\n\n\
             *Username:* `{}`\n\
             *Mac Address:* `{}`\n\
             *Connection time:* `{}`\n\n\
             What would you like to do?",
            pending.username,
            pending.mac_address,
            chrono::Local::now().to_rfc2822(),
        );

        View {
            text,
            keyboard: Some(keyboard),
        }
    }

    /// The CHOOSE_VLAN state: one button per VLAN plus Back.
    fn render_vlan_select(
        &self,
        registry: &dyn Registry,
        pending: &PendingDevice,
        back_token: &str,
    ) -> Result<View, BotError> {
        let vlans = registry.vlans()?;

        let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
        for chunk in vlans.chunks(BUTTONS_PER_ROW) {
            let row = chunk
                .iter()
                .map(|vlan| {
                    let selected = PendingDevice {
                        vlan_id: vlan.id.clone(),
                        ..pending.clone()
                    };
                    let token = self.cache.insert(selected);
                    InlineKeyboardButton::callback(
                        vlan.name.clone(),
                        callback_data(ACTION_SELECT_VLAN, &token),
                    )
                })
                .collect();
            rows.push(row);
        }
        // Back reuses the token of the notification it came from.
        rows.push(vec![InlineKeyboardButton::callback(
            "⬅ Back",
            callback_data(ACTION_BACK, back_token),
        )]);

        let text = format!(
            "*👤 Add `{}` to Network*\n\n\
             Please select which network you would like to add this device to:",
            pending.username,
        );

        Ok(View {
            text,
            keyboard: Some(InlineKeyboardMarkup::new(rows)),
        })
    }

    /// Route a button press belonging to this flow.
    ///
    /// Returns `Ok(None)` for actions of other flows; a stale token on one
    /// of our own actions is [`BotError::FailedToReadData`].
    pub fn handle_callback(
        &self,
        registry: &dyn Registry,
        action: &str,
        token: &str,
    ) -> Result<Option<View>, BotError> {
        if !matches!(
            action,
            ACTION_ADD | ACTION_SELECT_VLAN | ACTION_BACK | ACTION_IGNORE | ACTION_BLOCK
        ) {
            return Ok(None);
        }

        let pending = self.cache.get(token).ok_or(BotError::FailedToReadData)?;

        let view = match action {
            ACTION_ADD => self.render_vlan_select(registry, &pending, token)?,
            ACTION_SELECT_VLAN => {
                let vlan = registry.vlan(&pending.vlan_id)?;
                registry.create_device(Device {
                    username: pending.username.clone(),
                    password: pending.password.clone(),
                    vlan_id: vlan.id.clone(),
                    description: String::new(),
                })?;

                View::text_only(format!(
                    "*✅ Success! ✅*\n\n\
                     `{}` has been added to the *{}* network.\n\n\
                     You may reply to this message with a name to assign to this device.",
                    pending.username, vlan.name,
                ))
            }
            ACTION_BACK => self.render_notify(&pending),
            ACTION_IGNORE => View::text_only(format!(
                "*🚫 Request Ignored 🚫*\n\nNo action has been taken for `{}`.",
                pending.username,
            )),
            ACTION_BLOCK => {
                registry.block(&pending.username)?;
                View::text_only(format!(
                    "*🔒 User Blocked 🔒*\n\n\
                     `{}` has been blocked and further connections will be ignored.",
                    pending.username,
                ))
            }
            _ => unreachable!(),
        };

        Ok(Some(view))
    }

    /// A reply to the success message sets the device's display name.
    ///
    /// Returns the confirmation message when the reply was claimed;
    /// non-matching originals and unknown devices are ignored silently.
    pub fn handle_reply(
        &self,
        registry: &dyn Registry,
        original_text: &str,
        reply_text: &str,
    ) -> Result<Option<String>, BotError> {
        let Some(captures) = added_message_regex().captures(original_text) else {
            return Ok(None);
        };
        let username = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        if username.is_empty() {
            return Ok(None);
        }

        let Ok(mut device) = registry.device(username) else {
            return Ok(None);
        };

        device.description = reply_text.to_string();
        registry.update_device(device.clone())?;

        Ok(Some(format!(
            "Saved the name *{}* for the device *{}*.",
            device.description, device.username,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryStore, Vlan};
    use std::sync::Arc;

    fn store_with_vlans() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, name, default) in [("1", "Default", true), ("20", "IOT", false), ("30", "Guests", false), ("40", "Cameras", false)] {
            store
                .create_vlan(Vlan {
                    id: id.to_string(),
                    name: name.to_string(),
                    default,
                    tunnel_type: 0,
                    tunnel_medium_type: 0,
                })
                .unwrap();
        }
        store
    }

    fn attempt() -> LoginAttempt {
        LoginAttempt {
            username: "aa:bb:cc:11:22:33".to_string(),
            password: "aa:bb:cc:11:22:33".to_string(),
            mac_address: "AA-BB-CC-11-22-33".to_string(),
        }
    }

    fn button_data(view: &View, row: usize, col: usize) -> String {
        let keyboard = view.keyboard.as_ref().unwrap();
        match &keyboard.inline_keyboard[row][col].kind {
            teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
            other => panic!("unexpected button kind: {other:?}"),
        }
    }

    #[test]
    fn notification_offers_three_actions() {
        let flow = NewDeviceFlow::new();
        let view = flow.notify_view(&attempt());

        assert!(view.text.contains("aa:bb:cc:11:22:33"));
        assert!(view.text.contains("AA-BB-CC-11-22-33"));
        let keyboard = view.keyboard.as_ref().unwrap();
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert!(button_data(&view, 0, 0).starts_with("add:"));
        assert!(button_data(&view, 1, 0).starts_with("ignore:"));
        assert!(button_data(&view, 2, 0).starts_with("blocklist:"));
    }

    #[test]
    fn add_renders_vlan_selector_with_back() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let view = flow.notify_view(&attempt());
        let data = button_data(&view, 0, 0);
        let (_, token) = super::super::split_callback(&data).unwrap();

        let selector = flow
            .handle_callback(store.as_ref(), ACTION_ADD, &token)
            .unwrap()
            .unwrap();
        let keyboard = selector.keyboard.as_ref().unwrap();

        // Four VLANs in rows of three, then the Back row.
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert_eq!(keyboard.inline_keyboard[0].len(), 3);
        assert_eq!(keyboard.inline_keyboard[1].len(), 1);
        assert!(button_data(&selector, 2, 0).ends_with(&token));
    }

    #[test]
    fn selecting_vlan_creates_device() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let view = flow.notify_view(&attempt());
        let data = button_data(&view, 0, 0);
        let (_, token) = super::super::split_callback(&data).unwrap();

        let selector = flow
            .handle_callback(store.as_ref(), ACTION_ADD, token)
            .unwrap()
            .unwrap();
        // Second button in the first row is the "IOT" VLAN.
        let select_data = button_data(&selector, 0, 1);
        let (action, select_token) = super::super::split_callback(&select_data).unwrap();
        assert_eq!(action, ACTION_SELECT_VLAN);

        let done = flow
            .handle_callback(store.as_ref(), ACTION_SELECT_VLAN, select_token)
            .unwrap()
            .unwrap();
        assert!(done.text.contains("has been added to the *IOT* network"));
        assert!(done.keyboard.is_none());

        let device = store.device("aa:bb:cc:11:22:33").unwrap();
        assert_eq!(device.vlan_id, "20");
        assert_eq!(device.password, "aa:bb:cc:11:22:33");
    }

    #[test]
    fn ignore_leaves_registry_untouched() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let view = flow.notify_view(&attempt());
        let data = button_data(&view, 1, 0);
        let (_, token) = super::super::split_callback(&data).unwrap();

        let done = flow
            .handle_callback(store.as_ref(), ACTION_IGNORE, token)
            .unwrap()
            .unwrap();
        assert!(done.text.contains("Request Ignored"));
        assert!(store.devices().unwrap().is_empty());
        assert!(store.blocked().unwrap().is_empty());
    }

    #[test]
    fn block_adds_blocklist_entry() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let view = flow.notify_view(&attempt());
        let data = button_data(&view, 2, 0);
        let (_, token) = super::super::split_callback(&data).unwrap();

        let done = flow
            .handle_callback(store.as_ref(), ACTION_BLOCK, token)
            .unwrap()
            .unwrap();
        assert!(done.text.contains("User Blocked"));
        assert!(store.is_blocked("aa:bb:cc:11:22:33").unwrap());
    }

    #[test]
    fn back_returns_to_notification() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let view = flow.notify_view(&attempt());
        let data = button_data(&view, 0, 0);
        let (_, token) = super::super::split_callback(&data).unwrap();

        let back = flow
            .handle_callback(store.as_ref(), ACTION_BACK, token)
            .unwrap()
            .unwrap();
        assert!(back.text.contains("New Device Detected"));
        assert_eq!(back.keyboard.as_ref().unwrap().inline_keyboard.len(), 3);
    }

    #[test]
    fn stale_token_is_reported() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let result = flow.handle_callback(store.as_ref(), ACTION_ADD, "stale-token");
        assert!(matches!(result, Err(BotError::FailedToReadData)));
    }

    #[test]
    fn foreign_action_is_not_claimed() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let result = flow
            .handle_callback(store.as_ref(), "edit-delete", "whatever")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn reply_to_success_message_names_device() {
        let store = store_with_vlans();
        store
            .create_device(Device {
                username: "aa:bb:cc:11:22:33".to_string(),
                password: "aa:bb:cc:11:22:33".to_string(),
                vlan_id: "20".to_string(),
                description: String::new(),
            })
            .unwrap();
        let flow = NewDeviceFlow::new();

        // The text as Telegram echoes it back: markdown stripped.
        let original = "✅ Success! ✅\n\naa:bb:cc:11:22:33 has been added to the IOT network.\n\nYou may reply to this message with a name to assign to this device.";
        let confirmation = flow
            .handle_reply(store.as_ref(), original, "Living room lamp")
            .unwrap()
            .unwrap();

        assert!(confirmation.contains("Living room lamp"));
        assert_eq!(store.device("aa:bb:cc:11:22:33").unwrap().description, "Living room lamp");
    }

    #[test]
    fn reply_to_unrelated_message_is_ignored() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        assert!(flow
            .handle_reply(store.as_ref(), "some other message", "name")
            .unwrap()
            .is_none());
    }

    #[test]
    fn reply_for_missing_device_is_ignored() {
        let store = store_with_vlans();
        let flow = NewDeviceFlow::new();
        let original = "✅ Success! ✅\n\nff:ff:ff:ff:ff:ff has been added to the IOT network.";
        assert!(flow
            .handle_reply(store.as_ref(), original, "name")
            .unwrap()
            .is_none());
    }
}

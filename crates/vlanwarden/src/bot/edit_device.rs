//! `/edit` flow for registered (or blocked) devices.
//!
//! The edit view shows the device's name, username, and VLAN with the
//! actions that make sense for its state: blocked devices offer Unblock
//! and Delete, everything else offers Change VLAN, Block, and Delete.
//! Replying to the edit view renames the device.

use super::{callback_data, BotError, View};
use crate::cache::TokenCache;
use crate::registry::{Registry, RegistryError};
use regex::Regex;
use std::sync::OnceLock;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// Distinct action ids so edit buttons never collide with the new-device flow.
const ACTION_CHANGE_VLAN: &str = "edit-change-vlan";
const ACTION_BLOCK: &str = "edit-block";
const ACTION_UNBLOCK: &str = "edit-unblock";
const ACTION_DELETE: &str = "edit-delete";
const ACTION_BACK: &str = "edit-back";
const ACTION_SELECT_VLAN: &str = "edit-select-vlan";

const CACHE_SIZE: usize = 10;
const BUTTONS_PER_ROW: usize = 3;

/// State carried through the edit flow's callbacks.
#[derive(Debug, Clone)]
struct EditTarget {
    username: String,
    /// Set only on VLAN-selector buttons.
    vlan_id: String,
}

fn edit_message_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Username: (.*?)\n").expect("valid regex"))
}

pub struct EditDeviceFlow {
    cache: TokenCache<EditTarget>,
}

impl Default for EditDeviceFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl EditDeviceFlow {
    pub fn new() -> Self {
        EditDeviceFlow {
            cache: TokenCache::new(CACHE_SIZE),
        }
    }

    /// Resolve the `/edit` argument: display names first, then the
    /// literal username.
    pub fn resolve_target(&self, registry: &dyn Registry, arg: &str) -> String {
        match registry.device_by_description(arg) {
            Ok(device) => device.username,
            Err(_) => arg.to_string(),
        }
    }

    /// Render the edit view for a username.
    pub fn edit_view(&self, registry: &dyn Registry, username: &str) -> Result<View, BotError> {
        let blocked = registry.is_blocked(username)?;

        let mut text = "*📝 Edit Device 📝*\n".to_string();
        if blocked {
            text.push_str("\n*🔒 This device is blocked 🔒*\n");
        }

        let device = match registry.device(username) {
            Ok(device) => Some(device),
            Err(_) if blocked => None,
            Err(_) => {
                return Ok(View::text_only(format!(
                    "*🚫 User Not Found 🚫*\n\n`{username}` does not exist.",
                )));
            }
        };

        let vlan_name = match &device {
            Some(device) if !device.vlan_id.is_empty() => registry.vlan(&device.vlan_id)?.name,
            _ => String::new(),
        };
        let description = device.map(|d| d.description).unwrap_or_default();

        text.push_str(&format!(
            "\n*Name:* {description}\n\
             *Username:* {username}\n\
             *VLAN:* {vlan_name}\n\n\
             You may reply to this message with a new name for this device.",
        ));

        let token = self.cache.insert(EditTarget {
            username: username.to_string(),
            vlan_id: String::new(),
        });

        let rows = if blocked {
            vec![
                vec![InlineKeyboardButton::callback(
                    "🔓 Unblock",
                    callback_data(ACTION_UNBLOCK, &token),
                )],
                vec![InlineKeyboardButton::callback(
                    "🗑 Delete",
                    callback_data(ACTION_DELETE, &token),
                )],
            ]
        } else {
            vec![
                vec![InlineKeyboardButton::callback(
                    "🔄 Change VLAN",
                    callback_data(ACTION_CHANGE_VLAN, &token),
                )],
                vec![InlineKeyboardButton::callback(
                    "🔒 Block",
                    callback_data(ACTION_BLOCK, &token),
                )],
                vec![InlineKeyboardButton::callback(
                    "🗑 Delete",
                    callback_data(ACTION_DELETE, &token),
                )],
            ]
        };

        Ok(View {
            text,
            keyboard: Some(InlineKeyboardMarkup::new(rows)),
        })
    }

    fn render_vlan_select(
        &self,
        registry: &dyn Registry,
        target: &EditTarget,
        back_token: &str,
    ) -> Result<View, BotError> {
        let vlans = registry.vlans()?;

        let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
        for chunk in vlans.chunks(BUTTONS_PER_ROW) {
            let row = chunk
                .iter()
                .map(|vlan| {
                    let token = self.cache.insert(EditTarget {
                        username: target.username.clone(),
                        vlan_id: vlan.id.clone(),
                    });
                    InlineKeyboardButton::callback(
                        vlan.name.clone(),
                        callback_data(ACTION_SELECT_VLAN, &token),
                    )
                })
                .collect();
            rows.push(row);
        }
        rows.push(vec![InlineKeyboardButton::callback(
            "⬅ Back",
            callback_data(ACTION_BACK, back_token),
        )]);

        Ok(View {
            text: format!(
                "*📝 Edit Device 📝*\n\nPlease select the new VLAN for *{}*",
                target.username,
            ),
            keyboard: Some(InlineKeyboardMarkup::new(rows)),
        })
    }

    /// Route a button press belonging to this flow.
    pub fn handle_callback(
        &self,
        registry: &dyn Registry,
        action: &str,
        token: &str,
    ) -> Result<Option<View>, BotError> {
        if !matches!(
            action,
            ACTION_CHANGE_VLAN
                | ACTION_BLOCK
                | ACTION_UNBLOCK
                | ACTION_DELETE
                | ACTION_BACK
                | ACTION_SELECT_VLAN
        ) {
            return Ok(None);
        }

        let target = self.cache.get(token).ok_or(BotError::FailedToReadData)?;

        let view = match action {
            ACTION_CHANGE_VLAN => self.render_vlan_select(registry, &target, token)?,
            ACTION_BLOCK => {
                registry.block(&target.username)?;
                self.edit_view(registry, &target.username)?
            }
            ACTION_UNBLOCK => {
                registry.unblock(&target.username)?;
                self.edit_view(registry, &target.username)?
            }
            ACTION_DELETE => {
                registry.delete_device(&target.username)?;
                View::text_only(format!(
                    "*🗑 User Deleted 🗑*\n\n`{}` has been deleted.",
                    target.username,
                ))
            }
            ACTION_BACK => self.edit_view(registry, &target.username)?,
            ACTION_SELECT_VLAN => {
                let vlan = registry.vlan(&target.vlan_id)?;
                let mut device = registry.device(&target.username)?;
                device.vlan_id = vlan.id;
                registry.update_device(device)?;
                self.edit_view(registry, &target.username)?
            }
            _ => unreachable!(),
        };

        Ok(Some(view))
    }

    /// A reply to the edit view renames the device.
    ///
    /// A blocked username without a device is materialised through an
    /// unblock/block cycle first, so the description has somewhere to live.
    pub fn handle_reply(
        &self,
        registry: &dyn Registry,
        original_text: &str,
        reply_text: &str,
    ) -> Result<Option<String>, BotError> {
        let Some(captures) = edit_message_regex().captures(original_text) else {
            return Ok(None);
        };
        let username = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        if username.is_empty() {
            return Ok(None);
        }

        let mut device = match registry.device(username) {
            Ok(device) => device,
            Err(RegistryError::DeviceNotFound(_)) => {
                if !registry.is_blocked(username).unwrap_or(false) {
                    return Ok(None);
                }
                registry.unblock(username)?;
                registry.block(username)?;
                registry.device(username)?
            }
            Err(_) => return Ok(None),
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
    use crate::registry::{Device, MemoryStore, Vlan};
    use std::sync::Arc;
    use teloxide::types::InlineKeyboardButtonKind;

    const MAC: &str = "aa:bb:cc:11:22:33";

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, name, default) in [("1", "Default", true), ("20", "IOT", false)] {
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
            .create_device(Device {
                username: MAC.to_string(),
                password: MAC.to_string(),
                vlan_id: "20".to_string(),
                description: "printer".to_string(),
            })
            .unwrap();
        store
    }

    fn button_data(view: &View, row: usize, col: usize) -> String {
        match &view.keyboard.as_ref().unwrap().inline_keyboard[row][col].kind {
            InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
            other => panic!("unexpected button kind: {other:?}"),
        }
    }

    fn token_of(view: &View, row: usize, col: usize) -> String {
        let data = button_data(view, row, col);
        let (_, token) = super::super::split_callback(&data).unwrap();
        token.to_string()
    }

    #[test]
    fn resolve_prefers_description() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        assert_eq!(flow.resolve_target(store.as_ref(), "printer"), MAC);
        assert_eq!(flow.resolve_target(store.as_ref(), MAC), MAC);
        assert_eq!(flow.resolve_target(store.as_ref(), "missing"), "missing");
    }

    #[test]
    fn edit_view_shows_device_and_actions() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        let view = flow.edit_view(store.as_ref(), MAC).unwrap();

        assert!(view.text.contains("printer"));
        assert!(view.text.contains(&format!("Username: {MAC}")));
        assert!(view.text.contains("IOT"));
        let keyboard = view.keyboard.as_ref().unwrap();
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert!(button_data(&view, 0, 0).starts_with("edit-change-vlan:"));
    }

    #[test]
    fn edit_view_for_blocked_device_offers_unblock() {
        let store = seeded_store();
        store.block(MAC).unwrap();
        let flow = EditDeviceFlow::new();
        let view = flow.edit_view(store.as_ref(), MAC).unwrap();

        assert!(view.text.contains("blocked"));
        let keyboard = view.keyboard.as_ref().unwrap();
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert!(button_data(&view, 0, 0).starts_with("edit-unblock:"));
        assert!(button_data(&view, 1, 0).starts_with("edit-delete:"));
    }

    #[test]
    fn unknown_unblocked_target_renders_not_found() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        let view = flow.edit_view(store.as_ref(), "ff:ff:ff:ff:ff:ff").unwrap();
        assert!(view.text.contains("does not exist"));
        assert!(view.keyboard.is_none());
    }

    #[test]
    fn change_vlan_selects_and_updates() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        let view = flow.edit_view(store.as_ref(), MAC).unwrap();
        let token = token_of(&view, 0, 0);

        let selector = flow
            .handle_callback(store.as_ref(), ACTION_CHANGE_VLAN, &token)
            .unwrap()
            .unwrap();
        // First button is VLAN "1"; last row is Back.
        let select_token = token_of(&selector, 0, 0);

        let rendered = flow
            .handle_callback(store.as_ref(), ACTION_SELECT_VLAN, &select_token)
            .unwrap()
            .unwrap();
        assert!(rendered.text.contains("Default"));
        assert_eq!(store.device(MAC).unwrap().vlan_id, "1");
    }

    #[test]
    fn back_returns_to_edit_view() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        let view = flow.edit_view(store.as_ref(), MAC).unwrap();
        let token = token_of(&view, 0, 0);

        let selector = flow
            .handle_callback(store.as_ref(), ACTION_CHANGE_VLAN, &token)
            .unwrap()
            .unwrap();
        let back_row = selector.keyboard.as_ref().unwrap().inline_keyboard.len() - 1;
        let back_token = token_of(&selector, back_row, 0);

        let view = flow
            .handle_callback(store.as_ref(), ACTION_BACK, &back_token)
            .unwrap()
            .unwrap();
        assert!(view.text.contains("Edit Device"));
        assert!(view.text.contains(&format!("Username: {MAC}")));
    }

    #[test]
    fn block_then_unblock_round_trip() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        let view = flow.edit_view(store.as_ref(), MAC).unwrap();
        let token = token_of(&view, 1, 0);

        let blocked_view = flow
            .handle_callback(store.as_ref(), ACTION_BLOCK, &token)
            .unwrap()
            .unwrap();
        assert!(store.is_blocked(MAC).unwrap());
        assert!(blocked_view.text.contains("blocked"));

        let unblock_token = token_of(&blocked_view, 0, 0);
        flow.handle_callback(store.as_ref(), ACTION_UNBLOCK, &unblock_token)
            .unwrap()
            .unwrap();
        assert!(!store.is_blocked(MAC).unwrap());
    }

    #[test]
    fn delete_removes_device() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        let view = flow.edit_view(store.as_ref(), MAC).unwrap();
        let token = token_of(&view, 2, 0);

        let done = flow
            .handle_callback(store.as_ref(), ACTION_DELETE, &token)
            .unwrap()
            .unwrap();
        assert!(done.text.contains("User Deleted"));
        assert!(store.device(MAC).is_err());
    }

    #[test]
    fn stale_token_is_reported() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        assert!(matches!(
            flow.handle_callback(store.as_ref(), ACTION_DELETE, "stale"),
            Err(BotError::FailedToReadData)
        ));
    }

    #[test]
    fn reply_renames_device() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();

        let original = format!(
            "📝 Edit Device 📝\n\nName: printer\nUsername: {MAC}\nVLAN: IOT\n\nYou may reply to this message with a new name for this device."
        );
        let confirmation = flow
            .handle_reply(store.as_ref(), &original, "scanner")
            .unwrap()
            .unwrap();
        assert!(confirmation.contains("scanner"));
        assert_eq!(store.device(MAC).unwrap().description, "scanner");
    }

    #[test]
    fn reply_materialises_blocked_only_username() {
        let store = seeded_store();
        store.delete_device(MAC).unwrap();
        store.block(MAC).unwrap();
        let flow = EditDeviceFlow::new();

        let original = format!("📝 Edit Device 📝\n\nName: \nUsername: {MAC}\nVLAN: \n");
        flow.handle_reply(store.as_ref(), &original, "mystery box")
            .unwrap()
            .unwrap();

        let device = store.device(MAC).unwrap();
        assert_eq!(device.description, "mystery box");
        // Still blocked after the unblock/block dance.
        assert!(store.is_blocked(MAC).unwrap());
    }

    #[test]
    fn reply_for_unknown_username_is_ignored() {
        let store = seeded_store();
        let flow = EditDeviceFlow::new();
        let original = "📝 Edit Device 📝\n\nName: \nUsername: ff:ff:ff:ff:ff:ff\nVLAN: \n";
        assert!(flow
            .handle_reply(store.as_ref(), original, "name")
            .unwrap()
            .is_none());
    }
}

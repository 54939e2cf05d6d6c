//! Message component and modal data model
//!
//! Components live on a concrete message, addressed by a
//! [`ComponentPath`] (`channel_id/message_id`). The router keys its
//! component table by that path and scans rows in order when an interaction
//! arrives.
//!
//! Component shapes are a closed enum. Link buttons are the one oddity:
//! they carry a URL instead of a `custom_id`, never produce interactions,
//! and are therefore not routable.

use serde::{Deserialize, Serialize};

use crate::error::{HotclawError, Result};

/// Visual style of a button. `Link` buttons open a URL client-side and
/// never reach the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
    Link,
}

impl ButtonStyle {
    /// The numeric style used on the wire.
    pub fn wire_type(&self) -> u8 {
        match self {
            ButtonStyle::Primary => 1,
            ButtonStyle::Secondary => 2,
            ButtonStyle::Success => 3,
            ButtonStyle::Danger => 4,
            ButtonStyle::Link => 5,
        }
    }
}

/// One option of a select menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
}

impl SelectOption {
    pub fn new(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            description: None,
            default: false,
        }
    }
}

/// An interactive component attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Component {
    Button {
        /// Routing id; `None` only for link buttons.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        custom_id: Option<String>,
        label: String,
        style: ButtonStyle,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default)]
        disabled: bool,
    },
    SelectMenu {
        custom_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        #[serde(default = "one")]
        min_values: u8,
        #[serde(default = "one")]
        max_values: u8,
        options: Vec<SelectOption>,
    },
}

fn one() -> u8 {
    1
}

impl Component {
    /// Creates a routable button.
    pub fn button(custom_id: &str, label: &str, style: ButtonStyle) -> Self {
        Component::Button {
            custom_id: Some(custom_id.to_string()),
            label: label.to_string(),
            style,
            url: None,
            disabled: false,
        }
    }

    /// Creates a link button. Link buttons have no `custom_id` and never
    /// produce interactions.
    pub fn link_button(url: &str, label: &str) -> Self {
        Component::Button {
            custom_id: None,
            label: label.to_string(),
            style: ButtonStyle::Link,
            url: Some(url.to_string()),
            disabled: false,
        }
    }

    /// Creates a single-choice select menu.
    pub fn select_menu(custom_id: &str, options: Vec<SelectOption>) -> Self {
        Component::SelectMenu {
            custom_id: custom_id.to_string(),
            placeholder: None,
            min_values: 1,
            max_values: 1,
            options,
        }
    }

    /// The routing id, if this component can produce interactions.
    pub fn custom_id(&self) -> Option<&str> {
        match self {
            Component::Button { custom_id, .. } => custom_id.as_deref(),
            Component::SelectMenu { custom_id, .. } => Some(custom_id),
        }
    }

    /// Whether interactions from this component can be routed to a callback.
    pub fn is_routable(&self) -> bool {
        self.custom_id().is_some()
    }

    /// Validates the component shape.
    ///
    /// # Errors
    ///
    /// - `HotclawError::InvalidDefinition` for a link button missing its URL
    ///   or carrying a `custom_id`
    /// - `HotclawError::InvalidDefinition` for a non-link button without a
    ///   `custom_id`
    /// - `HotclawError::InvalidDefinition` for select menus with no options,
    ///   more than 25, or inconsistent min/max values
    pub fn validate(&self) -> Result<()> {
        match self {
            Component::Button {
                custom_id,
                style,
                url,
                label,
                ..
            } => {
                if label.is_empty() {
                    return Err(HotclawError::InvalidDefinition(
                        "Button label cannot be empty".to_string(),
                    ));
                }
                match style {
                    ButtonStyle::Link => {
                        if url.is_none() {
                            return Err(HotclawError::InvalidDefinition(
                                "Link button requires a url".to_string(),
                            ));
                        }
                        if custom_id.is_some() {
                            return Err(HotclawError::InvalidDefinition(
                                "Link button cannot have a custom_id".to_string(),
                            ));
                        }
                    }
                    _ => {
                        if custom_id.as_deref().map_or(true, |id| id.is_empty()) {
                            return Err(HotclawError::InvalidDefinition(format!(
                                "Button '{}' requires a custom_id",
                                label
                            )));
                        }
                        if url.is_some() {
                            return Err(HotclawError::InvalidDefinition(format!(
                                "Button '{}' cannot have a url unless it is a link button",
                                label
                            )));
                        }
                    }
                }
            }
            Component::SelectMenu {
                custom_id,
                min_values,
                max_values,
                options,
                ..
            } => {
                if custom_id.is_empty() {
                    return Err(HotclawError::InvalidDefinition(
                        "Select menu requires a custom_id".to_string(),
                    ));
                }
                if options.is_empty() || options.len() > 25 {
                    return Err(HotclawError::InvalidDefinition(format!(
                        "Select menu '{}' needs 1-25 options, has {}",
                        custom_id,
                        options.len()
                    )));
                }
                if *min_values > *max_values || *max_values as usize > options.len() {
                    return Err(HotclawError::InvalidDefinition(format!(
                        "Select menu '{}' has inconsistent min/max values",
                        custom_id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A horizontal row of components.
///
/// A row holds up to five buttons, or exactly one select menu.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionRow {
    pub components: Vec<Component>,
}

impl ActionRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component to the row.
    pub fn with(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Validates the row and each component in it.
    pub fn validate(&self) -> Result<()> {
        if self.components.is_empty() {
            return Err(HotclawError::InvalidDefinition(
                "Action row cannot be empty".to_string(),
            ));
        }
        let has_select = self
            .components
            .iter()
            .any(|c| matches!(c, Component::SelectMenu { .. }));
        if has_select && self.components.len() > 1 {
            return Err(HotclawError::InvalidDefinition(
                "A select menu must be alone in its row".to_string(),
            ));
        }
        if self.components.len() > 5 {
            return Err(HotclawError::InvalidDefinition(format!(
                "Action row holds at most 5 components, has {}",
                self.components.len()
            )));
        }
        for component in &self.components {
            component.validate()?;
        }
        Ok(())
    }
}

/// Address of a message carrying components: `channel_id/message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentPath {
    pub channel_id: String,
    pub message_id: String,
}

impl ComponentPath {
    pub fn new(channel_id: &str, message_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        }
    }

    /// The table key for this path.
    pub fn key(&self) -> String {
        format!("{}/{}", self.channel_id, self.message_id)
    }
}

impl std::fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// Parses `"channel_id/message_id"`.
impl std::str::FromStr for ComponentPath {
    type Err = HotclawError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((channel, message)) if !channel.is_empty() && !message.is_empty() => {
                Ok(ComponentPath::new(channel, message))
            }
            _ => Err(HotclawError::InvalidDefinition(format!(
                "Component path '{}' is not 'channel_id/message_id'",
                s
            ))),
        }
    }
}

/// Text input style inside a modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFieldStyle {
    Short,
    Paragraph,
}

/// One text field of a modal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalField {
    pub custom_id: String,
    pub label: String,
    pub style: TextFieldStyle,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl ModalField {
    pub fn short(custom_id: &str, label: &str) -> Self {
        Self {
            custom_id: custom_id.to_string(),
            label: label.to_string(),
            style: TextFieldStyle::Short,
            required: true,
            placeholder: None,
        }
    }

    pub fn paragraph(custom_id: &str, label: &str) -> Self {
        Self {
            custom_id: custom_id.to_string(),
            label: label.to_string(),
            style: TextFieldStyle::Paragraph,
            required: true,
            placeholder: None,
        }
    }
}

/// A modal dialog shown in response to an interaction.
///
/// Submissions are routed back through a waiter keyed by
/// `custom_id/user_id`, so only the user the modal was shown to can
/// complete it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub fields: Vec<ModalField>,
}

impl Modal {
    pub fn new(custom_id: &str, title: &str) -> Self {
        Self {
            custom_id: custom_id.to_string(),
            title: title.to_string(),
            fields: Vec::new(),
        }
    }

    /// Adds a text field.
    pub fn with_field(mut self, field: ModalField) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates the modal shape: non-empty id and title, 1-5 fields.
    pub fn validate(&self) -> Result<()> {
        if self.custom_id.is_empty() {
            return Err(HotclawError::InvalidDefinition(
                "Modal requires a custom_id".to_string(),
            ));
        }
        if self.title.is_empty() || self.title.len() > 45 {
            return Err(HotclawError::InvalidDefinition(format!(
                "Modal '{}' needs a title of 1-45 characters",
                self.custom_id
            )));
        }
        if self.fields.is_empty() || self.fields.len() > 5 {
            return Err(HotclawError::InvalidDefinition(format!(
                "Modal '{}' needs 1-5 fields, has {}",
                self.custom_id,
                self.fields.len()
            )));
        }
        Ok(())
    }

    /// The waiter key for a modal shown to a specific user.
    pub fn waiter_key(custom_id: &str, user_id: &str) -> String {
        format!("{}/{}", custom_id, user_id)
    }
}

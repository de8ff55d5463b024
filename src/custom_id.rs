//! Custom ids carried by buttons and modals
//!
//! Ids are formatted with `Display` and parsed back with `FromStr`, so a
//! button built by an engine always routes to the matching handler.

use derive_more::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ComponentId {
    #[display("gw_join")]
    GiveawayJoin,
    #[display("gw_participants")]
    GiveawayParticipants,
    /// Leave button in the ephemeral join reply; carries the giveaway id
    #[display("gw_leave:{_0}")]
    GiveawayLeave(u64),
    #[display("gwsetup_start")]
    SetupStart,
    #[display("gwsetup_edit")]
    SetupEdit,
    #[display("gwsetup_cancel")]
    SetupCancel,
    #[display("gwedit_{_0}")]
    Edit(EditField),
    #[display("gwedit_cancel")]
    EditCancel,
    #[display("warns_prev")]
    WarningsPrev,
    #[display("warns_next")]
    WarningsNext,
    /// Remove the warning at this absolute index
    #[display("warns_remove:{_0}")]
    WarningsRemove(usize),
}

/// Giveaway field edited through the edit panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EditField {
    #[display("prize")]
    Prize,
    #[display("duration")]
    Duration,
    #[display("winners")]
    Winners,
}

impl FromStr for EditField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prize" => Ok(Self::Prize),
            "duration" => Ok(Self::Duration),
            "winners" => Ok(Self::Winners),
            _ => Err(()),
        }
    }
}

impl FromStr for ComponentId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = match s {
            "gw_join" => Self::GiveawayJoin,
            "gw_participants" => Self::GiveawayParticipants,
            "gwsetup_start" => Self::SetupStart,
            "gwsetup_edit" => Self::SetupEdit,
            "gwsetup_cancel" => Self::SetupCancel,
            "gwedit_cancel" => Self::EditCancel,
            "warns_prev" => Self::WarningsPrev,
            "warns_next" => Self::WarningsNext,
            other => {
                if let Some(id) = other.strip_prefix("gw_leave:") {
                    Self::GiveawayLeave(id.parse().map_err(|_| ())?)
                } else if let Some(index) = other.strip_prefix("warns_remove:") {
                    Self::WarningsRemove(index.parse().map_err(|_| ())?)
                } else if let Some(field) = other.strip_prefix("gwedit_") {
                    Self::Edit(field.parse()?)
                } else {
                    return Err(());
                }
            }
        };
        Ok(id)
    }
}

/// Modal ids carry the panel message they belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ModalId {
    #[display("gwsetup_modal:{_0}")]
    Setup(u64),
    #[display("gwedit_modal:{field}:{panel}")]
    Edit { field: EditField, panel: u64 },
    #[display("warns_modal:{panel}:{index}")]
    RemoveWarning { panel: u64, index: usize },
}

impl FromStr for ModalId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let kind = parts.next().ok_or(())?;
        let mut next = || parts.next().ok_or(());
        let id = match kind {
            "gwsetup_modal" => Self::Setup(next()?.parse().map_err(|_| ())?),
            "gwedit_modal" => {
                let field = next()?.parse()?;
                let panel = next()?.parse().map_err(|_| ())?;
                Self::Edit { field, panel }
            }
            "warns_modal" => {
                let panel = next()?.parse().map_err(|_| ())?;
                let index = next()?.parse().map_err(|_| ())?;
                Self::RemoveWarning { panel, index }
            }
            _ => return Err(()),
        };
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_ids_parse_back() {
        for id in [
            ComponentId::GiveawayJoin,
            ComponentId::GiveawayLeave(1_234),
            ComponentId::Edit(EditField::Duration),
            ComponentId::EditCancel,
            ComponentId::WarningsRemove(7),
        ] {
            assert_eq!(id.to_string().parse::<ComponentId>(), Ok(id));
        }
        assert_eq!(ComponentId::GiveawayLeave(9).to_string(), "gw_leave:9");
    }

    #[test]
    fn test_modal_ids_parse_back() {
        let edit = ModalId::Edit {
            field: EditField::Winners,
            panel: 55,
        };
        assert_eq!(edit.to_string(), "gwedit_modal:winners:55");
        assert_eq!("gwedit_modal:winners:55".parse::<ModalId>(), Ok(edit));
        assert_eq!(
            "warns_modal:8:2".parse::<ModalId>(),
            Ok(ModalId::RemoveWarning { panel: 8, index: 2 })
        );
    }

    #[test]
    fn test_unknown_ids_are_rejected() {
        assert!("naming_configure_1".parse::<ComponentId>().is_err());
        assert!("gw_leave:abc".parse::<ComponentId>().is_err());
        assert!("gwedit_colour".parse::<ComponentId>().is_err());
        assert!("warns_modal:8".parse::<ModalId>().is_err());
    }
}

use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use super::panel::{button_ids, ControlPanelState, PanelAction, PanelButton};
use crate::audio::{queue::RepeatMode, session::PlaybackState};

/// Botón pulsado en el panel, tal como llega en `custom_id`.
///
/// El botón de pausa/reanudar comparte id, así que la acción concreta se
/// decide con el estado actual de la sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelPress {
    Previous,
    Toggle,
    Skip,
    Stop,
    Repeat,
}

impl PanelPress {
    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PREVIOUS => Some(PanelPress::Previous),
            button_ids::TOGGLE => Some(PanelPress::Toggle),
            button_ids::SKIP => Some(PanelPress::Skip),
            button_ids::STOP => Some(PanelPress::Stop),
            button_ids::REPEAT => Some(PanelPress::Repeat),
            _ => None,
        }
    }

    pub fn resolve(self, state: PlaybackState) -> PanelAction {
        match self {
            PanelPress::Previous => PanelAction::Previous,
            PanelPress::Toggle if state == PlaybackState::Paused => PanelAction::Resume,
            PanelPress::Toggle => PanelAction::Pause,
            PanelPress::Skip => PanelAction::Skip,
            PanelPress::Stop => PanelAction::Stop,
            PanelPress::Repeat => PanelAction::Repeat,
        }
    }
}

fn button_style(button: &PanelButton, repeat: RepeatMode) -> ButtonStyle {
    match button.action {
        PanelAction::Stop => ButtonStyle::Danger,
        PanelAction::Repeat if repeat != RepeatMode::Off => ButtonStyle::Success,
        PanelAction::Pause | PanelAction::Resume => ButtonStyle::Primary,
        _ => ButtonStyle::Secondary,
    }
}

/// Fila de botones del panel. Se reemplaza completa en cada actualización.
pub fn panel_components(panel: &ControlPanelState) -> Vec<CreateActionRow> {
    let buttons = panel
        .buttons
        .iter()
        .map(|button| {
            CreateButton::new(button.action.custom_id())
                .emoji(button.action.emoji())
                .style(button_style(button, panel.repeat))
                .disabled(!button.enabled)
        })
        .collect();

    vec![CreateActionRow::Buttons(buttons)]
}

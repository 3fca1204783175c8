//! Template Renderer (spec §4.B): a pure function from `(kind, context)` to
//! `(subject, body_text, body_html)`. No I/O, no randomness, no wall-clock
//! reads — identical inputs must produce byte-identical output (spec §8).

pub mod templates;

use serde::{Deserialize, Serialize};

use crate::domain::GeoPoint;
use templates::LEGAL_DISCLAIMER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    MissedCheckinAlert,
    Reminder,
    SosAlert,
}

impl TemplateKind {
    /// The stable `type` value downstream push filters key on (spec §6):
    /// `reminder` | `alert` | `sos`.
    pub fn wire_type(self) -> &'static str {
        match self {
            TemplateKind::MissedCheckinAlert => "alert",
            TemplateKind::Reminder => "reminder",
            TemplateKind::SosAlert => "sos",
        }
    }
}

/// An included pet, sanitized down to the fields the alert may disclose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetContext {
    pub name: String,
    pub species: String,
    pub care_notes: Option<String>,
}

/// An included information-vault entry, sanitized to title/body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEntryContext {
    pub title: String,
    pub body: String,
}

/// Sanitized fields the renderer is allowed to see. The renderer never
/// performs I/O (spec §4.B) — everything it needs is assembled by the caller
/// (scanner, reminder scheduler, or SOS coordinator) beforehand.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderContext {
    pub episode_id: String,
    pub user_display_name: String,
    pub contact_display_name: String,
    pub personal_message: Option<String>,
    pub pets: Vec<PetContext>,
    pub vault_entries: Vec<VaultEntryContext>,
    pub location: Option<GeoPoint>,
    /// Reminder-only: hours remaining before the soft deadline.
    pub hours_before: Option<i64>,
    pub custom_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
}

/// Pure rendering function (spec §4.B). Deterministic: `render(k, ctx) ==
/// render(k, ctx)` byte-for-byte, which the test suite exploits directly.
pub fn render(kind: TemplateKind, ctx: &RenderContext) -> RenderedMessage {
    let (subject, mut lines) = match kind {
        TemplateKind::MissedCheckinAlert => (
            templates::email_subject(&ctx.user_display_name),
            vec![format!(
                "{} has missed their scheduled check-in.",
                ctx.user_display_name
            )],
        ),
        TemplateKind::Reminder => {
            let hours = ctx.hours_before.unwrap_or(0);
            let prefix = ctx
                .custom_prefix
                .as_deref()
                .map(|p| format!("{} ", p))
                .unwrap_or_default();
            (
                format!("{}check-in reminder", prefix),
                vec![format!(
                    "{}Reminder: your check-in is due in about {} hour(s).",
                    prefix, hours
                )],
            )
        }
        TemplateKind::SosAlert => (
            format!("[SoloCheck] SOS - {}", ctx.user_display_name),
            vec![format!(
                "{} has triggered an SOS alert.",
                ctx.user_display_name
            )],
        ),
    };

    if let Some(msg) = &ctx.personal_message {
        lines.push(String::new());
        lines.push(format!("Personal message: {}", msg));
    }

    if !ctx.pets.is_empty() {
        lines.push(String::new());
        lines.push("Pets that may need care:".to_string());
        for pet in &ctx.pets {
            let notes = pet
                .care_notes
                .as_deref()
                .map(|n| format!(" — {}", n))
                .unwrap_or_default();
            lines.push(format!("  - {} ({}){}", pet.name, pet.species, notes));
        }
    }

    if !ctx.vault_entries.is_empty() {
        lines.push(String::new());
        lines.push("Shared information:".to_string());
        for entry in &ctx.vault_entries {
            lines.push(format!("  - {}: {}", entry.title, entry.body));
        }
    }

    if let Some(loc) = &ctx.location {
        lines.push(String::new());
        lines.push(format!("Last known location: {:.5}, {:.5}", loc.lat, loc.lng));
    }

    lines.push(String::new());
    lines.push(LEGAL_DISCLAIMER.to_string());

    let body_text = lines.join("\n");
    let body_html = format!(
        "<p>{}</p>",
        body_text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace("\n\n", "</p><p>")
            .replace('\n', "<br>")
    );

    RenderedMessage {
        subject,
        body_text,
        body_html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> RenderContext {
        RenderContext {
            episode_id: "ep-1".into(),
            user_display_name: "Alex".into(),
            contact_display_name: "Jordan".into(),
            ..Default::default()
        }
    }

    #[test]
    fn render_is_deterministic() {
        let ctx = base_ctx();
        assert_eq!(
            render(TemplateKind::MissedCheckinAlert, &ctx),
            render(TemplateKind::MissedCheckinAlert, &ctx)
        );
    }

    #[test]
    fn every_kind_embeds_the_disclaimer() {
        let ctx = base_ctx();
        for kind in [
            TemplateKind::MissedCheckinAlert,
            TemplateKind::Reminder,
            TemplateKind::SosAlert,
        ] {
            let rendered = render(kind, &ctx);
            assert!(rendered.body_text.contains(LEGAL_DISCLAIMER));
        }
    }

    #[test]
    fn missed_checkin_subject_matches_fixed_format() {
        let ctx = base_ctx();
        let rendered = render(TemplateKind::MissedCheckinAlert, &ctx);
        assert_eq!(rendered.subject, "[SoloCheck] Alex - connectivity alert");
    }

    #[test]
    fn personal_message_and_pets_are_embedded_when_present() {
        let mut ctx = base_ctx();
        ctx.personal_message = Some("Please check on my apartment.".into());
        ctx.pets = vec![PetContext {
            name: "Biscuit".into(),
            species: "cat".into(),
            care_notes: Some("needs insulin twice daily".into()),
        }];
        let rendered = render(TemplateKind::MissedCheckinAlert, &ctx);
        assert!(rendered.body_text.contains("Please check on my apartment."));
        assert!(rendered.body_text.contains("Biscuit"));
        assert!(rendered.body_text.contains("needs insulin twice daily"));
    }

    #[test]
    fn location_omitted_when_absent() {
        let ctx = base_ctx();
        let rendered = render(TemplateKind::MissedCheckinAlert, &ctx);
        assert!(!rendered.body_text.contains("Last known location"));
    }
}

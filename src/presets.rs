//! The fixed catalog of studio styles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudioStyle {
    #[default]
    CinematicFood,
    TopDownGourmet,
    SizzlingBbq,
    CozyInterior,
    AestheticLifestyle,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StudioPreset {
    pub id: StudioStyle,
    pub name: &'static str,
    pub description: &'static str,
    pub thumbnail: &'static str,
    pub prompt: &'static str,
}

pub static STUDIO_PRESETS: [StudioPreset; 5] = [
    StudioPreset {
        id: StudioStyle::CinematicFood,
        name: "Cinematic Food",
        description: "Moody low-key lighting with shallow depth of field, like a film still.",
        thumbnail: "/thumbnails/cinematic_food.svg",
        prompt: "Transform this food photo into a cinematic commercial shot: dramatic low-key side lighting, deep shadows, warm highlights, shallow depth of field and a dark textured backdrop.",
    },
    StudioPreset {
        id: StudioStyle::TopDownGourmet,
        name: "Top-Down Gourmet",
        description: "Clean overhead flat lay for menus and magazines.",
        thumbnail: "/thumbnails/top_down_gourmet.svg",
        prompt: "Re-shoot this dish as an overhead flat lay for a gourmet magazine: soft even daylight, a marble or linen surface, tasteful props at the edges and crisp detail on the food.",
    },
    StudioPreset {
        id: StudioStyle::SizzlingBbq,
        name: "Sizzling BBQ",
        description: "Smoke, flame and glistening texture for grilled dishes.",
        thumbnail: "/thumbnails/sizzling_bbq.svg",
        prompt: "Make this dish look freshly grilled in a premium barbecue ad: glistening surfaces, wisps of rising smoke, ember glow in the background and high-contrast warm lighting.",
    },
    StudioPreset {
        id: StudioStyle::CozyInterior,
        name: "Cozy Interior",
        description: "Warm ambient light for cafes, rooms and spaces.",
        thumbnail: "/thumbnails/cozy_interior.svg",
        prompt: "Restyle this space as a cozy interior feature: warm golden-hour light through windows, soft practical lamps, balanced exposure and an inviting, lived-in atmosphere.",
    },
    StudioPreset {
        id: StudioStyle::AestheticLifestyle,
        name: "Aesthetic Lifestyle",
        description: "Bright, airy pastel tones for social media.",
        thumbnail: "/thumbnails/aesthetic_lifestyle.svg",
        prompt: "Turn this photo into a bright, airy lifestyle shot for social media: soft diffused natural light, pastel tones, a minimal clean background and gentle film-like color grading.",
    },
];

impl StudioStyle {
    pub fn preset(self) -> &'static StudioPreset {
        // Catalog is indexed in declaration order.
        &STUDIO_PRESETS[self as usize]
    }
}

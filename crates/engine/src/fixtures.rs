//! Shared definition corpus for unit tests.

use promptsmith_registry::{DefinitionSource, Loader, RegistrySnapshot, SourceDocument};

pub(crate) const CATEGORIES: &str = r#"
[[categories]]
id = "portrait"
type = "subject"
schema_version = 3
tags = ["people"]
[categories.keywords]
primary = ["portrait", "headshot"]
specific = ["close up portrait"]
[categories.prompts.positive]
required = ["portrait of a person"]
optional = ["detailed face"]
[categories.prompts.negative]
required = ["blurry"]
optional = ["deformed hands"]
[[categories.adapters.recommended]]
name = "face_detail"
strength = 0.8
[[categories.adapters.recommended]]
name = "skin_texture"
strength = 0.6
role = "detail"
[categories.settings.steps]
min = 20
max = 40
default = 30
[categories.settings.cfg]
min = 4.0
max = 9.0
default = 7.0
[categories.templates]
preferred = ["sdxl_portrait", "sdxl_base"]
base_families = ["sdxl"]
[categories.composition]
priority = 70

[[categories]]
id = "landscape"
type = "subject"
schema_version = 3
[categories.keywords]
primary = ["landscape", "mountains"]
[categories.prompts.positive]
required = ["wide landscape"]
[[categories.adapters.recommended]]
name = "terrain_detail"
strength = 0.5
[categories.composition]
priority = 30

[[categories]]
id = "night"
type = "modifier"
schema_version = 3
[categories.keywords]
primary = ["night"]
specific = ["starry night sky"]
[categories.prompts.positive]
required = ["night scene"]
optional = ["moonlight"]
[categories.prompts.negative]
required = ["blurry"]
optional = ["overexposed"]
[[categories.adapters.recommended]]
name = "night_lighting"
strength = 0.7
role = "environment"
[[categories.adapters.recommended]]
name = "film_grain"
strength = 0.3
[categories.settings.cfg]
min = 5.0
max = 8.0
default = 6.0
[categories.composition]
priority = 40
enhances = ["portrait"]

[[categories]]
id = "anime"
type = "style"
schema_version = 3
[categories.keywords]
primary = ["anime"]
[categories.prompts.positive]
required = ["anime style"]
[categories.adapters]
avoid = ["skin_texture"]
[[categories.adapters.recommended]]
name = "anime_lines"
strength = 0.9
[categories.composition]
priority = 80
conflicts_with = ["photorealistic"]

[[categories]]
id = "photorealistic"
type = "style"
schema_version = 3
[categories.keywords]
primary = ["photo", "photorealistic"]
[categories.prompts.positive]
required = ["photorealistic"]
[[categories.adapters.recommended]]
name = "skin_texture"
strength = 0.9
[categories.composition]
priority = 60

[[categories]]
id = "studio"
type = "setting"
schema_version = 3
[categories.keywords]
primary = ["studio"]
specific = ["studio lighting"]
[categories.prompts.positive]
required = ["studio backdrop"]
[categories.settings.steps]
min = 25
max = 50
default = 35
[categories.composition]
priority = 50

[[categories]]
id = "boudoir"
type = "setting"
schema_version = 3
policy_tier = "mature"
[categories.keywords]
primary = ["bedroom"]
[categories.prompts.positive]
required = ["bedroom interior"]
[categories.composition]
priority = 55
"#;

pub(crate) const TEMPLATES: &str = r#"
[[templates]]
id = "sdxl_base"
schema_version = 3
modality = "image"
base_families = ["sdxl"]
max_adapters = 4
best_for = ["general"]

[[templates]]
id = "sdxl_portrait"
schema_version = 3
modality = "image"
base_families = ["sdxl"]
capabilities = ["face_fix"]
max_adapters = 3
best_for = ["people", "portrait"]

[[templates]]
id = "flux_video"
schema_version = 3
modality = "video"
base_families = ["flux"]
max_adapters = 2
"#;

pub(crate) fn snapshot() -> RegistrySnapshot {
    Loader::new()
        .load(&DefinitionSource::Documents(vec![
            SourceDocument::new("categories.toml", CATEGORIES),
            SourceDocument::new("templates.toml", TEMPLATES),
        ]))
        .expect("fixture corpus loads")
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in material node kinds.
//!
//! A starter set registered through the ledgers at bootstrap: constants,
//! coordinate sources, math, texture sampling and the PBR output. Hosting
//! applications register their own kinds the same way.

use crate::content::{NodeContent, PortSpec};
use crate::port::TypeTag;
use crate::registry::{ContentFactory, DisplayRule, EditorRegistries, SearchEntry};
use serde::{Deserialize, Serialize};

const VALUE_TAGS: [TypeTag; 5] = [
    TypeTag::Float,
    TypeTag::Vector2,
    TypeTag::Vector3,
    TypeTag::Vector4,
    TypeTag::Color,
];

macro_rules! impl_content_boilerplate {
    ($ty:ident, $name:expr) => {
        fn class_name(&self) -> &str {
            stringify!($ty)
        }

        fn display_name(&self) -> String {
            $name.to_string()
        }

        fn serialize(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
        }

        fn clone_box(&self) -> Box<dyn NodeContent> {
            Box::new(self.clone())
        }
    };
}

fn factory_for<T>() -> ContentFactory
where
    T: NodeContent + Default + for<'de> Deserialize<'de> + 'static,
{
    ContentFactory::new(
        || Box::new(T::default()) as Box<dyn NodeContent>,
        |payload| {
            serde_json::from_value::<T>(payload.clone())
                .ok()
                .map(|c| Box::new(c) as Box<dyn NodeContent>)
        },
    )
}

/// Constant float value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloatValue {
    /// The emitted value
    pub value: f32,
}

impl NodeContent for FloatValue {
    impl_content_boilerplate!(FloatValue, "Float");

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("Value", TypeTag::Float)]
    }
}

/// Constant RGBA color
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorValue {
    /// The emitted color
    pub rgba: [f32; 4],
}

impl Default for ColorValue {
    fn default() -> Self {
        Self {
            rgba: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl NodeContent for ColorValue {
    impl_content_boilerplate!(ColorValue, "Color");

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("Color", TypeTag::Color)]
    }
}

/// Mesh UV coordinate source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UvSource {
    /// UV set index
    pub channel: u8,
}

impl NodeContent for UvSource {
    impl_content_boilerplate!(UvSource, "UV");

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("UV", TypeTag::Vector2)]
    }
}

/// Component-wise addition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Add {}

impl NodeContent for Add {
    impl_content_boilerplate!(Add, "Add");

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::accepting("A", VALUE_TAGS),
            PortSpec::accepting("B", VALUE_TAGS),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::accepting("Result", VALUE_TAGS)]
    }
}

/// Component-wise multiplication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Multiply {}

impl NodeContent for Multiply {
    impl_content_boilerplate!(Multiply, "Multiply");

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::accepting("A", VALUE_TAGS),
            PortSpec::accepting("B", VALUE_TAGS),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::accepting("Result", VALUE_TAGS)]
    }
}

/// Linear interpolation between two values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lerp {}

impl NodeContent for Lerp {
    impl_content_boilerplate!(Lerp, "Lerp");

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::accepting("A", VALUE_TAGS),
            PortSpec::accepting("B", VALUE_TAGS),
            PortSpec::new("Mix", TypeTag::Float),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::accepting("Result", VALUE_TAGS)]
    }
}

/// Texture lookup at a UV coordinate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextureSample {
    /// Asset path of the sampled texture
    pub path: String,
}

impl NodeContent for TextureSample {
    impl_content_boilerplate!(TextureSample, "Texture Sample");

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("Texture", TypeTag::Texture),
            PortSpec::new("UV", TypeTag::Vector2),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("Color", TypeTag::Color),
            PortSpec::new("Alpha", TypeTag::Float),
        ]
    }
}

/// Final PBR material output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialOutput {}

impl NodeContent for MaterialOutput {
    impl_content_boilerplate!(MaterialOutput, "Material Output");

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("Base Color", TypeTag::Color),
            PortSpec::new("Metallic", TypeTag::Float),
            PortSpec::new("Roughness", TypeTag::Float),
            PortSpec::new("Normal", TypeTag::Vector3),
            PortSpec::new("Emission", TypeTag::Color),
            PortSpec::new("Opacity", TypeTag::Float),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }
}

/// Register the built-in kinds on all four ledgers
pub fn register_standard_kinds(registries: &mut EditorRegistries) {
    fn entry(name: &str, keywords: &[&str], category: &str) -> SearchEntry {
        SearchEntry {
            display_name: name.to_string(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            category: category.to_string(),
        }
    }

    registries.types.register("FloatValue", factory_for::<FloatValue>());
    registries.display.register(
        "FloatValue",
        DisplayRule {
            header_color: [60, 120, 60],
            header_text: None,
        },
    );
    registries.properties.register("FloatValue", "float_editor");
    registries
        .nodes
        .register("FloatValue", entry("Float", &["constant", "scalar"], "Input"));

    registries.types.register("ColorValue", factory_for::<ColorValue>());
    registries.display.register(
        "ColorValue",
        DisplayRule {
            header_color: [150, 120, 50],
            header_text: None,
        },
    );
    registries.properties.register("ColorValue", "color_editor");
    registries
        .nodes
        .register("ColorValue", entry("Color", &["constant", "rgba"], "Input"));

    registries.types.register("UvSource", factory_for::<UvSource>());
    registries
        .nodes
        .register("UvSource", entry("UV", &["coordinate", "texcoord"], "Input"));

    registries.types.register("Add", factory_for::<Add>());
    registries
        .nodes
        .register("Add", entry("Add", &["sum", "plus", "math"], "Math"));

    registries.types.register("Multiply", factory_for::<Multiply>());
    registries
        .nodes
        .register("Multiply", entry("Multiply", &["product", "math"], "Math"));

    registries.types.register("Lerp", factory_for::<Lerp>());
    registries
        .nodes
        .register("Lerp", entry("Lerp", &["mix", "interpolate", "blend"], "Math"));

    registries.types.register("TextureSample", factory_for::<TextureSample>());
    registries.display.register(
        "TextureSample",
        DisplayRule {
            header_color: [70, 110, 150],
            header_text: None,
        },
    );
    registries
        .properties
        .register("TextureSample", "texture_editor");
    registries.nodes.register(
        "TextureSample",
        entry("Texture Sample", &["image", "lookup"], "Texture"),
    );

    registries.types.register("MaterialOutput", factory_for::<MaterialOutput>());
    registries.display.register(
        "MaterialOutput",
        DisplayRule {
            header_color: [140, 70, 70],
            header_text: None,
        },
    );
    registries.nodes.register(
        "MaterialOutput",
        entry("Material Output", &["result", "pbr", "surface"], "Output"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_survives_serialize_deserialize() {
        let mut registries = EditorRegistries::new();
        register_standard_kinds(&mut registries);

        let content = TextureSample {
            path: "textures/rust.png".to_string(),
        };
        let payload = NodeContent::serialize(&content);
        let rebuilt = registries
            .types
            .deserialize("TextureSample", &payload)
            .expect("registered kind");
        assert_eq!(rebuilt.serialize(), payload);
    }

    #[test]
    fn test_material_output_is_a_sink() {
        let output = MaterialOutput::default();
        assert!(output.output_ports().is_empty());
        assert_eq!(output.input_ports()[0].name, "Base Color");
    }
}

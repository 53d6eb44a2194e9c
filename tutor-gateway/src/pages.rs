//! HTML pages for the chat and image views.

use crate::session::{Role, Turn};
use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

const HOME_TEMPLATE: &str = include_str!("../templates/home.hbs");
const IMAGE_TEMPLATE: &str = include_str!("../templates/image.hbs");

#[derive(Serialize)]
struct HomeContext<'a> {
    turns: Vec<&'a Turn>,
}

#[derive(Serialize)]
struct ImageContext<'a> {
    prompt: Option<&'a str>,
    image_url: Option<&'a str>,
}

/// Compiled page templates.
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_template_string("home", HOME_TEMPLATE)?;
        registry.register_template_string("image", IMAGE_TEMPLATE)?;
        Ok(Self { registry })
    }

    /// Chat page; the system persona is never shown.
    pub fn render_home(&self, turns: &[Turn]) -> Result<String, RenderError> {
        let context = HomeContext {
            turns: turns.iter().filter(|t| t.role != Role::System).collect(),
        };
        self.registry.render("home", &context)
    }

    /// Image page, optionally showing a generated image.
    pub fn render_image(
        &self,
        prompt: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<String, RenderError> {
        self.registry
            .render("image", &ImageContext { prompt, image_url })
    }
}

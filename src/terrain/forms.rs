//! Terrain forms: the surface materials painted onto the terrain.
//!
//! A form descriptor file maps form map colors to forms:
//!
//! ```text
//! TerrainForms 1
//!
//! 0xFF00FF00 simple { "grass.jpg" Tag=1 TexScale=4.0 }
//! 0xFF808080 complex {
//!     0 { "sand.jpg" }
//!     100 { "rock.jpg" TexScale=2.0 }
//!     200 { "snow.jpg" Tag=3 }
//! }
//! ```
//!
//! A complex item picks one of its bands by the raw elevation of the vertex.

use std::path::Path;
use std::str::FromStr;

use super::error::LoadError;
use super::height_map::HeightMap;
use crate::config::tokenizer::{Token, TokenError, Tokenizer};

/// Color used for form map pixels outside the image.
const OUTSIDE_COLOR: u32 = 0xFF00_0000;

#[derive(Clone, Debug, PartialEq)]
pub struct FormData {
    pub texture_name: String,
    pub tag: u32,
    pub tex_scale: f32,
}

impl Default for FormData {
    fn default() -> Self {
        Self {
            texture_name: String::new(),
            tag: 0,
            tex_scale: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormBand {
    /// Lowest raw elevation this band applies to.
    pub height: u8,
    pub data: FormData,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FormItemKind {
    Simple(FormData),
    Complex(Vec<FormBand>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormItem {
    /// ARGB color of the item in the form map.
    pub map_color: u32,
    pub kind: FormItemKind,
    /// Index of the item's first form in the flattened form table.
    first_form: u8,
}

impl FormItem {
    /// Index into the flattened form table for a vertex with the given raw elevation.
    pub fn form_index(&self, elevation: u8) -> u8 {
        match &self.kind {
            FormItemKind::Simple(_) => self.first_form,
            FormItemKind::Complex(bands) => {
                let band = bands
                    .iter()
                    .rposition(|band| band.height <= elevation)
                    .unwrap_or(0);
                self.first_form + band as u8
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormDescError {
    #[error(transparent)]
    Syntax(#[from] TokenError),

    #[error("No terrain forms defined, at least one is required")]
    NoForms,

    #[error("Too many terrain forms ({0}), at most 255 are allowed")]
    TooManyForms(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, strum::EnumString)]
enum ItemType {
    #[strum(serialize = "simple")]
    Simple,
    #[strum(serialize = "complex")]
    Complex,
}

#[derive(Clone, Copy, Debug, PartialEq, strum::EnumString)]
enum DataParam {
    Tag,
    TexScale,
}

/// Parsed form descriptor.
#[derive(Debug)]
pub struct FormDescriptor {
    items: Vec<FormItem>,
    forms: Vec<FormData>,
}

impl FormDescriptor {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        tracing::info!("Loading terrain form descriptor: {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|err| LoadError::io(path, err))?;
        Self::parse(&text).map_err(|err| match err {
            FormDescError::Syntax(TokenError { line, message }) => LoadError::Syntax {
                path: path.to_path_buf(),
                line,
                message,
            },
            err => LoadError::content(path, err.to_string()),
        })
    }

    pub fn parse(text: &str) -> Result<Self, FormDescError> {
        let mut tokenizer = Tokenizer::new(text)?;

        tokenizer.expect_identifier("TerrainForms")?;
        let version_line = tokenizer.line();
        let version = tokenizer.take_u32()?;
        if version != 1 {
            return Err(TokenError {
                line: version_line,
                message: format!("unsupported version {version}"),
            }
            .into());
        }

        let mut items = vec![];
        let mut form_count = 0_usize;
        while !tokenizer.is_eof() {
            let map_color = tokenizer.take_u32()?;
            let item_type_line = tokenizer.line();
            let item_type = tokenizer.take_identifier()?;
            let kind = match ItemType::from_str(&item_type) {
                Ok(ItemType::Simple) => FormItemKind::Simple(Self::parse_data(&mut tokenizer)?),
                Ok(ItemType::Complex) => FormItemKind::Complex(Self::parse_bands(&mut tokenizer)?),
                Err(_) => {
                    return Err(TokenError {
                        line: item_type_line,
                        message: format!("expected \"simple\" or \"complex\", found \"{item_type}\""),
                    }
                    .into());
                }
            };

            let count = match &kind {
                FormItemKind::Simple(_) => 1,
                FormItemKind::Complex(bands) => bands.len(),
            };

            items.push(FormItem {
                map_color,
                kind,
                first_form: form_count.min(u8::MAX as usize) as u8,
            });
            form_count += count;
        }

        if form_count == 0 {
            return Err(FormDescError::NoForms);
        }
        if form_count > u8::MAX as usize {
            return Err(FormDescError::TooManyForms(form_count));
        }

        let forms = items
            .iter()
            .flat_map(|item| match &item.kind {
                FormItemKind::Simple(data) => vec![data.clone()],
                FormItemKind::Complex(bands) => bands.iter().map(|b| b.data.clone()).collect(),
            })
            .collect();

        Ok(Self { items, forms })
    }

    fn parse_bands(tokenizer: &mut Tokenizer) -> Result<Vec<FormBand>, TokenError> {
        tokenizer.expect_symbol('{')?;

        let mut bands: Vec<FormBand> = vec![];
        while !tokenizer.is_symbol('}') {
            let line = tokenizer.line();
            let height = tokenizer.take_u8()?;
            match bands.last() {
                None if height != 0 => {
                    return Err(TokenError {
                        line,
                        message: "the first band height must be 0".to_string(),
                    });
                }
                Some(last) if height <= last.height => {
                    return Err(TokenError {
                        line,
                        message: format!(
                            "band height {height} must be greater than the previous {}",
                            last.height
                        ),
                    });
                }
                _ => {}
            }

            let data = Self::parse_data(tokenizer)?;
            bands.push(FormBand { height, data });

            if tokenizer.is_symbol(',') {
                tokenizer.next()?;
            }
        }

        if bands.is_empty() {
            return Err(tokenizer.error("a complex form needs at least one band"));
        }
        tokenizer.next()?;

        Ok(bands)
    }

    fn parse_data(tokenizer: &mut Tokenizer) -> Result<FormData, TokenError> {
        tokenizer.expect_symbol('{')?;

        let mut data = FormData {
            texture_name: tokenizer.take_string()?,
            ..Default::default()
        };

        while !tokenizer.is_symbol('}') {
            if let Token::Identifier(name) = tokenizer.current() {
                let param = DataParam::from_str(name)
                    .map_err(|_| tokenizer.error(format!("unknown form parameter \"{name}\"")))?;
                tokenizer.next()?;
                tokenizer.expect_symbol('=')?;
                match param {
                    DataParam::Tag => data.tag = tokenizer.take_u32()?,
                    DataParam::TexScale => data.tex_scale = tokenizer.take_f32()?,
                }
            } else {
                return Err(tokenizer.error(format!(
                    "expected a form parameter or '}}', found {}",
                    tokenizer.current()
                )));
            }
        }
        tokenizer.next()?;

        Ok(data)
    }

    pub fn items(&self) -> &[FormItem] {
        &self.items
    }

    /// The flattened form table; form indices point into this.
    pub fn forms(&self) -> &[FormData] {
        &self.forms
    }

    pub fn form_count(&self) -> usize {
        self.forms.len()
    }

    /// Resolve a form index for every heightmap node from the form map image at `path`.
    pub fn classify_file(&self, path: &Path, height_map: &HeightMap) -> Result<Vec<u8>, LoadError> {
        tracing::info!("Loading terrain form map: {}", path.display());

        let image = image::open(path)
            .map_err(|source| LoadError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();

        if image.width() == 0 || image.height() == 0 {
            return Err(LoadError::content(path, "the form map image is empty"));
        }

        Ok(self.classify(&image, height_map))
    }

    /// Resolve a form index for every heightmap node. Pixel `(x, z)` of the image belongs to node
    /// `(x, z)`; nodes outside the image use opaque black.
    pub fn classify(&self, image: &image::RgbaImage, height_map: &HeightMap) -> Vec<u8> {
        let size = height_map.size();
        let elevations = height_map.elevations();

        let mut classifier = FormClassifier::new(self);
        let mut form_map = Vec::with_capacity(elevations.len());
        for z in 0..size.y {
            for x in 0..size.x {
                let color = if x < image.width() && z < image.height() {
                    argb(image.get_pixel(x, z))
                } else {
                    OUTSIDE_COLOR
                };
                let elevation = elevations[(z * size.x + x) as usize];
                form_map.push(classifier.classify(color, elevation));
            }
        }

        debug_assert_eq!(form_map.len(), (size.x * size.y) as usize);
        form_map
    }
}

fn argb(pixel: &image::Rgba<u8>) -> u32 {
    let [r, g, b, a] = pixel.0;
    u32::from_be_bytes([a, r, g, b])
}

/// Sum of absolute per-channel differences over A, R, G and B.
pub fn color_distance(a: u32, b: u32) -> u32 {
    a.to_be_bytes()
        .iter()
        .zip(b.to_be_bytes().iter())
        .map(|(&a, &b)| a.abs_diff(b) as u32)
        .sum()
}

/// Maps colors to forms, moving the last exact match to the front of the search order since
/// neighboring pixels usually share a color.
pub struct FormClassifier<'a> {
    items: &'a [FormItem],
    order: Vec<usize>,
}

impl<'a> FormClassifier<'a> {
    pub fn new(descriptor: &'a FormDescriptor) -> Self {
        Self {
            items: &descriptor.items,
            order: (0..descriptor.items.len()).collect(),
        }
    }

    pub fn classify(&mut self, color: u32, elevation: u8) -> u8 {
        if let Some(position) = self
            .order
            .iter()
            .position(|&i| self.items[i].map_color == color)
        {
            let item = self.order[position];
            self.order.swap(0, position);
            return self.items[item].form_index(elevation);
        }

        let mut best = self.order[0];
        let mut best_distance = color_distance(color, self.items[best].map_color);
        for &i in &self.order[1..] {
            let distance = color_distance(color, self.items[i].map_color);
            if distance < best_distance {
                best = i;
                best_distance = distance;
            }
        }
        self.items[best].form_index(elevation)
    }
}

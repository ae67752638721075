use crate::{BoxError, Error};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AtlasPage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub pma: bool,
    pub min_filter: AtlasFilter,
    pub mag_filter: AtlasFilter,
    pub wrap_u: AtlasWrap,
    pub wrap_v: AtlasWrap,
}

impl AtlasPage {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            width: 0,
            height: 0,
            scale: 1.0,
            pma: false,
            min_filter: AtlasFilter::default(),
            mag_filter: AtlasFilter::default(),
            wrap_u: AtlasWrap::default(),
            wrap_v: AtlasWrap::default(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum AtlasFilter {
    Nearest,
    #[default]
    Linear,
    MipMap,
    MipMapNearestNearest,
    MipMapLinearNearest,
    MipMapNearestLinear,
    MipMapLinearLinear,
}

impl FromStr for AtlasFilter {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, ()> {
        Ok(match value {
            "Nearest" => AtlasFilter::Nearest,
            "Linear" => AtlasFilter::Linear,
            "MipMap" => AtlasFilter::MipMap,
            "MipMapNearestNearest" => AtlasFilter::MipMapNearestNearest,
            "MipMapLinearNearest" => AtlasFilter::MipMapLinearNearest,
            "MipMapNearestLinear" => AtlasFilter::MipMapNearestLinear,
            "MipMapLinearLinear" => AtlasFilter::MipMapLinearLinear,
            _ => return Err(()),
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AtlasWrap {
    #[default]
    ClampToEdge,
    Repeat,
}

/// A packed image inside an atlas page. Sizes are in page pixels.
#[derive(Clone, Debug)]
pub struct AtlasRegion {
    pub name: String,
    pub page: usize,
    /// Counter-clockwise packing rotation: 0, 90, 180 or 270.
    pub degrees: u16,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Whitespace stripped left of and below the packed image.
    pub offset_x: f32,
    pub offset_y: f32,
    pub original_width: u32,
    pub original_height: u32,
}

impl AtlasRegion {
    fn new(name: &str, page: usize) -> Self {
        Self {
            name: name.to_string(),
            page,
            degrees: 0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            offset_x: 0.0,
            offset_y: 0.0,
            original_width: 0,
            original_height: 0,
        }
    }

    /// Page UVs for a region attachment quad, in BR, BL, UL, UR order.
    pub fn quad_uvs(&self, page: &AtlasPage) -> [[f32; 2]; 4] {
        let w = page.width.max(1) as f32;
        let h = page.height.max(1) as f32;
        let u = self.x as f32 / w;
        let v = self.y as f32 / h;
        let (packed_w, packed_h) = match self.degrees {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        };
        let u2 = (self.x + packed_w) as f32 / w;
        let v2 = (self.y + packed_h) as f32 / h;

        match self.degrees {
            90 => [[u2, v], [u2, v2], [u, v2], [u, v]],
            180 => [[u, v], [u2, v], [u2, v2], [u, v2]],
            270 => [[u, v2], [u, v], [u2, v], [u2, v2]],
            _ => [[u2, v2], [u, v2], [u, v], [u2, v]],
        }
    }

    /// Maps a mesh UV (relative to the original, unstripped image) into page UV space.
    pub fn map_uv(&self, page: &AtlasPage, uv: [f32; 2]) -> [f32; 2] {
        let tw = page.width.max(1) as f32;
        let th = page.height.max(1) as f32;
        let ow = self.original_width.max(1) as f32;
        let oh = self.original_height.max(1) as f32;
        let (rw, rh) = (self.width as f32, self.height as f32);
        let (ox, oy) = (self.offset_x, self.offset_y);
        let u = self.x as f32 / tw;
        let v = self.y as f32 / th;

        match self.degrees {
            90 => {
                let u = u - (oh - oy - rh) / tw;
                let v = v - (ow - ox - rw) / th;
                [u + uv[1] * oh / tw, v + (1.0 - uv[0]) * ow / th]
            }
            180 => {
                let u = u - (ow - ox - rw) / tw;
                let v = v - oy / th;
                [u + (1.0 - uv[0]) * ow / tw, v + (1.0 - uv[1]) * oh / th]
            }
            270 => {
                let u = u - oy / tw;
                let v = v - ox / th;
                [u + (1.0 - uv[1]) * oh / tw, v + uv[0] * ow / th]
            }
            _ => {
                let u = u - ox / tw;
                let v = v - (oh - oy - rh) / th;
                [u + uv[0] * ow / tw, v + uv[1] * oh / th]
            }
        }
    }
}

/// Parsed atlas description, without textures.
#[derive(Clone, Debug, Default)]
pub struct AtlasData {
    pub pages: Vec<AtlasPage>,
    pub regions: Vec<AtlasRegion>,
    index: HashMap<String, usize>,
}

impl AtlasData {
    pub fn parse(input: &str) -> Result<Self, Error> {
        parse_atlas(input)
    }

    pub fn region(&self, name: &str) -> Option<&AtlasRegion> {
        self.regions.get(*self.index.get(name)?)
    }

    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }

    fn push_region(&mut self, line: usize, region: AtlasRegion) -> Result<(), Error> {
        if region.width == 0 || region.height == 0 {
            return Err(parse_error(
                line,
                format!("region '{}' has no size", region.name),
            ));
        }
        if self.index.contains_key(&region.name) {
            log::warn!("atlas region '{}' defined twice, keeping the last", region.name);
        }
        self.index.insert(region.name.clone(), self.regions.len());
        self.regions.push(region);
        Ok(())
    }
}

impl FromStr for AtlasData {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_atlas(s)
    }
}

fn parse_error(line: usize, message: String) -> Error {
    Error::AtlasParse {
        message: format!("line {line}: {message}"),
    }
}

fn parse_atlas(input: &str) -> Result<AtlasData, Error> {
    let mut atlas = AtlasData::default();
    let mut region: Option<(usize, AtlasRegion)> = None;
    let mut expect_page = true;
    let mut page_has_regions = false;

    for (number, raw) in input.lines().enumerate() {
        let line_no = number + 1;
        let line = raw.trim();

        if line.is_empty() {
            if let Some((start, finished)) = region.take() {
                atlas.push_region(start, finished)?;
            }
            if page_has_regions {
                expect_page = true;
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            if let Some((start, finished)) = region.take() {
                atlas.push_region(start, finished)?;
            }
            if expect_page {
                atlas.pages.push(AtlasPage::new(line));
                expect_page = false;
                page_has_regions = false;
            } else {
                region = Some((line_no, AtlasRegion::new(line, atlas.pages.len() - 1)));
                page_has_regions = true;
            }
            continue;
        };

        if expect_page {
            return Err(parse_error(line_no, format!("'{line}' before any page")));
        }
        let (key, value) = (key.trim(), value.trim());
        let invalid = |what: &str| parse_error(line_no, format!("invalid {what} '{value}'"));

        if let Some((_, region)) = region.as_mut() {
            match key {
                "rotate" => region.degrees = parse_degrees(value).ok_or_else(|| invalid("rotate"))?,
                "bounds" => {
                    let [x, y, w, h] = parse_numbers(value).ok_or_else(|| invalid("bounds"))?;
                    (region.x, region.y, region.width, region.height) = (x, y, w, h);
                }
                "xy" => {
                    [region.x, region.y] = parse_numbers(value).ok_or_else(|| invalid("xy"))?;
                }
                "size" => {
                    [region.width, region.height] =
                        parse_numbers(value).ok_or_else(|| invalid("size"))?;
                }
                "orig" => {
                    [region.original_width, region.original_height] =
                        parse_numbers(value).ok_or_else(|| invalid("orig"))?;
                }
                "offset" => {
                    [region.offset_x, region.offset_y] =
                        parse_numbers(value).ok_or_else(|| invalid("offset"))?;
                }
                "offsets" => {
                    let [x, y, w, h]: [f32; 4] =
                        parse_numbers(value).ok_or_else(|| invalid("offsets"))?;
                    region.offset_x = x;
                    region.offset_y = y;
                    region.original_width = w as u32;
                    region.original_height = h as u32;
                }
                _ => {}
            }
            if region.original_width == 0 {
                region.original_width = region.width;
            }
            if region.original_height == 0 {
                region.original_height = region.height;
            }
        } else {
            let Some(page) = atlas.pages.last_mut() else {
                return Err(parse_error(line_no, format!("'{line}' before any page")));
            };
            match key {
                "size" => {
                    [page.width, page.height] = parse_numbers(value).ok_or_else(|| invalid("size"))?;
                }
                "scale" => {
                    page.scale = value
                        .parse::<f32>()
                        .ok()
                        .filter(|s| s.is_finite() && *s > 0.0)
                        .ok_or_else(|| invalid("scale"))?;
                }
                "filter" => {
                    let (min, mag) = value.split_once(',').unwrap_or((value, value));
                    page.min_filter = min.trim().parse().map_err(|_| invalid("filter"))?;
                    page.mag_filter = mag.trim().parse().map_err(|_| invalid("filter"))?;
                }
                "repeat" => {
                    let repeat_u = value.contains('x');
                    let repeat_v = value.contains('y');
                    let wrap = |on: bool| if on { AtlasWrap::Repeat } else { AtlasWrap::ClampToEdge };
                    page.wrap_u = wrap(repeat_u);
                    page.wrap_v = wrap(repeat_v);
                }
                "pma" => {
                    page.pma = value.parse::<bool>().map_err(|_| invalid("pma"))?;
                }
                _ => {}
            }
        }
    }

    if let Some((start, finished)) = region.take() {
        atlas.push_region(start, finished)?;
    }

    if atlas.pages.is_empty() {
        return Err(Error::AtlasParse {
            message: "atlas has no pages".to_string(),
        });
    }
    if let Some(page) = atlas.pages.iter().find(|p| p.width == 0 || p.height == 0) {
        return Err(Error::AtlasParse {
            message: format!("page '{}' has no size", page.name),
        });
    }
    log::debug!(
        "parsed atlas: {} pages, {} regions",
        atlas.pages.len(),
        atlas.regions.len()
    );
    Ok(atlas)
}

fn parse_numbers<T: FromStr + Copy + Default, const N: usize>(value: &str) -> Option<[T; N]> {
    let mut out = [T::default(); N];
    let mut parts = value.split(',');
    for slot in &mut out {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    parts.next().is_none().then_some(out)
}

fn parse_degrees(value: &str) -> Option<u16> {
    match value {
        "true" => Some(90),
        "false" => Some(0),
        _ => {
            let degrees: i32 = value.parse().ok()?;
            let degrees = degrees.rem_euclid(360);
            (degrees % 90 == 0).then_some(degrees as u16)
        }
    }
}

/// Creates and destroys GPU textures for atlas pages.
pub trait TextureLoader {
    type Texture;

    fn load(&mut self, page: &AtlasPage, path: &str) -> Result<Self::Texture, BoxError>;

    fn unload(&mut self, texture: Self::Texture);
}

/// [`TextureLoader`] backed by a pair of closures.
pub struct TextureCallbacks<T, F, G> {
    load: F,
    unload: G,
    _texture: PhantomData<fn() -> T>,
}

impl<T, F, G> TextureCallbacks<T, F, G>
where
    F: FnMut(&str) -> Result<T, BoxError>,
    G: FnMut(T),
{
    pub fn new(load: F, unload: G) -> Self {
        Self {
            load,
            unload,
            _texture: PhantomData,
        }
    }
}

impl<T, F, G> TextureLoader for TextureCallbacks<T, F, G>
where
    F: FnMut(&str) -> Result<T, BoxError>,
    G: FnMut(T),
{
    type Texture = T;

    fn load(&mut self, _page: &AtlasPage, path: &str) -> Result<T, BoxError> {
        (self.load)(path)
    }

    fn unload(&mut self, texture: T) {
        (self.unload)(texture)
    }
}

fn page_path(dir: &str, page: &str) -> String {
    if dir.is_empty() {
        page.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{page}")
    } else {
        format!("{dir}/{page}")
    }
}

/// Atlas description plus one loaded texture per page. Dropping it unloads the textures.
pub struct Atlas<L: TextureLoader> {
    data: AtlasData,
    textures: Vec<L::Texture>,
    loader: L,
}

impl<L: TextureLoader> Atlas<L> {
    /// Parses `text` and loads each page from `dir` joined with the page name.
    pub fn load(text: &str, dir: &str, loader: L) -> Result<Self, Error> {
        Self::from_data(AtlasData::parse(text)?, dir, loader)
    }

    /// Loads page textures for already parsed data. On failure, textures loaded so far are
    /// unloaded again.
    pub fn from_data(data: AtlasData, dir: &str, mut loader: L) -> Result<Self, Error> {
        let mut textures = Vec::with_capacity(data.pages.len());
        for page in &data.pages {
            let path = page_path(dir, &page.name);
            match loader.load(page, &path) {
                Ok(texture) => textures.push(texture),
                Err(source) => {
                    while let Some(texture) = textures.pop() {
                        loader.unload(texture);
                    }
                    return Err(Error::TextureLoad { path, source });
                }
            }
        }
        Ok(Self {
            data,
            textures,
            loader,
        })
    }

    pub fn data(&self) -> &AtlasData {
        &self.data
    }

    pub fn pages(&self) -> &[AtlasPage] {
        &self.data.pages
    }

    pub fn region(&self, name: &str) -> Option<&AtlasRegion> {
        self.data.region(name)
    }

    pub fn texture(&self, page: usize) -> Option<&L::Texture> {
        self.textures.get(page)
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

impl<L: TextureLoader> Drop for Atlas<L> {
    fn drop(&mut self) {
        for texture in self.textures.drain(..) {
            self.loader.unload(texture);
        }
    }
}

use bevy::asset::io::Reader;
use bevy::asset::{AssetLoader, AsyncReadExt, LoadContext};
use bevy::prelude::*;
use bevy::reflect::TypePath;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

const FLIP_FLAGS: u32 = 0xE000_0000;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid map JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map has zero-sized tiles ({0}x{1})")]
    TileSize(u32, u32),
    #[error("map is too large ({0}x{1} tiles)")]
    TooLarge(u32, u32),
    #[error("layer `{layer}` is {width}x{height}, map is {map_width}x{map_height}")]
    LayerGrid {
        layer: String,
        width: u32,
        height: u32,
        map_width: u32,
        map_height: u32,
    },
    #[error("layer `{layer}` holds {actual} tiles, expected {expected}")]
    LayerSize {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error("layer `{0}` uses an encoded data format; export the map with CSV layer data")]
    UnsupportedEncoding(String),
    #[error("tileset `{0}` is external; embed it in the map")]
    ExternalTileset(String),
}

#[derive(Debug, Error)]
pub enum TiledMapLoaderError {
    #[error("could not read map: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Map(#[from] MapError),
}

#[derive(Deserialize)]
struct RawMap {
    width: u32,
    height: u32,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default)]
    layers: Vec<RawLayer>,
    #[serde(default)]
    tilesets: Vec<RawTileset>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawLayer {
    Tilelayer {
        name: String,
        width: u32,
        height: u32,
        data: RawLayerData,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    Objectgroup {
        name: String,
        #[serde(default)]
        objects: Vec<RawObject>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLayerData {
    Tiles(Vec<u32>),
    Encoded(String),
}

fn default_visible() -> bool {
    true
}

#[derive(Deserialize)]
struct RawTileset {
    firstgid: u32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    tiles: Vec<RawTile>,
}

#[derive(Deserialize)]
struct RawTile {
    id: u32,
    #[serde(default)]
    properties: Vec<RawProperty>,
}

#[derive(Deserialize)]
struct RawProperty {
    name: String,
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct RawObject {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    name: String,
    x: f32,
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    gid: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

pub type Properties = HashMap<String, PropertyValue>;

#[derive(Clone, Debug)]
pub struct Tileset {
    pub name: String,
    pub first_gid: u32,
    tile_properties: HashMap<u32, Properties>,
}

#[derive(Clone, Debug)]
pub struct Tile {
    pub gid: u32,
    pub index: u32,
    pub collides: bool,
    pub properties: Properties,
}

impl Tile {
    pub fn bool_property(&self, name: &str) -> bool {
        matches!(self.properties.get(name), Some(PropertyValue::Bool(true)))
    }
}

#[derive(Clone, Debug)]
pub struct TileLayer {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub visible: bool,
    tiles: Vec<Option<Tile>>,
}

impl TileLayer {
    pub fn tile_at(&self, col: i32, row: i32) -> Option<&Tile> {
        if col < 0 || row < 0 || col >= self.width as i32 || row >= self.height as i32 {
            return None;
        }
        self.tiles[(row as u32 * self.width + col as u32) as usize].as_ref()
    }

    pub fn is_solid(&self, col: i32, row: i32) -> bool {
        self.tile_at(col, row).is_some_and(|t| t.collides)
    }

    pub fn set_collision_by_property(&mut self, name: &str) -> usize {
        let mut count = 0;
        for tile in self.tiles.iter_mut().flatten() {
            if tile.bool_property(name) {
                tile.collides = true;
                count += 1;
            }
        }
        count
    }

    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32, &Tile)> + '_ {
        let width = self.width;
        self.tiles
            .iter()
            .enumerate()
            .filter_map(move |(i, t)| t.as_ref().map(|t| (i as u32 % width, i as u32 / width, t)))
    }
}

#[derive(Clone, Debug)]
pub struct MapObject {
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub gid: Option<u32>,
}

impl MapObject {
    // Tile objects anchor at their bottom-left corner, others at top-left.
    pub fn center(&self) -> Vec2 {
        let half = Vec2::new(self.width, self.height) * 0.5;
        if self.gid.is_some() {
            Vec2::new(self.x + half.x, self.y - half.y)
        } else {
            Vec2::new(self.x + half.x, self.y + half.y)
        }
    }

    pub fn world_center(&self) -> Vec2 {
        map_to_world(self.center())
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }
}

#[derive(Clone, Debug)]
pub struct ObjectLayer {
    pub name: String,
    pub objects: Vec<MapObject>,
}

#[derive(Clone, Debug)]
pub struct LevelMap {
    pub width: u32,
    pub height: u32,
    pub tile_size: Vec2,
    pub tilesets: Vec<Tileset>,
    pub tile_layers: Vec<TileLayer>,
    pub object_layers: Vec<ObjectLayer>,
}

// Map pixels are y-down from the top-left corner; the world is y-up.
pub fn map_to_world(p: Vec2) -> Vec2 {
    Vec2::new(p.x, -p.y)
}

impl LevelMap {
    pub fn from_json(bytes: &[u8]) -> Result<Self, MapError> {
        let raw: RawMap = serde_json::from_slice(bytes)?;
        if raw.tilewidth == 0 || raw.tileheight == 0 {
            return Err(MapError::TileSize(raw.tilewidth, raw.tileheight));
        }
        let area = raw
            .width
            .checked_mul(raw.height)
            .and_then(|a| usize::try_from(a).ok())
            .ok_or(MapError::TooLarge(raw.width, raw.height))?;

        let mut tilesets = Vec::with_capacity(raw.tilesets.len());
        for ts in raw.tilesets {
            if let Some(source) = ts.source {
                return Err(MapError::ExternalTileset(source));
            }
            let tile_properties = ts
                .tiles
                .into_iter()
                .map(|t| {
                    let props = t
                        .properties
                        .iter()
                        .filter_map(|p| PropertyValue::from_json(&p.value).map(|v| (p.name.clone(), v)))
                        .collect();
                    (t.id, props)
                })
                .collect();
            tilesets.push(Tileset {
                name: ts.name,
                first_gid: ts.firstgid,
                tile_properties,
            });
        }
        tilesets.sort_by_key(|t| t.first_gid);

        let mut map = LevelMap {
            width: raw.width,
            height: raw.height,
            tile_size: Vec2::new(raw.tilewidth as f32, raw.tileheight as f32),
            tilesets,
            tile_layers: Vec::new(),
            object_layers: Vec::new(),
        };

        for layer in raw.layers {
            match layer {
                RawLayer::Tilelayer {
                    name,
                    width,
                    height,
                    data,
                    visible,
                } => {
                    let RawLayerData::Tiles(gids) = data else {
                        return Err(MapError::UnsupportedEncoding(name));
                    };
                    if (width, height) != (map.width, map.height) {
                        return Err(MapError::LayerGrid {
                            layer: name,
                            width,
                            height,
                            map_width: map.width,
                            map_height: map.height,
                        });
                    }
                    if gids.len() != area {
                        return Err(MapError::LayerSize {
                            layer: name,
                            expected: area,
                            actual: gids.len(),
                        });
                    }
                    let tiles = gids.into_iter().map(|gid| map.resolve(gid)).collect();
                    map.tile_layers.push(TileLayer {
                        name,
                        width,
                        height,
                        visible,
                        tiles,
                    });
                }
                RawLayer::Objectgroup { name, objects } => {
                    let objects = objects
                        .into_iter()
                        .map(|o| MapObject {
                            id: o.id,
                            name: o.name,
                            x: o.x,
                            y: o.y,
                            width: o.width,
                            height: o.height,
                            gid: o.gid.map(|g| g & !FLIP_FLAGS),
                        })
                        .collect();
                    map.object_layers.push(ObjectLayer { name, objects });
                }
                RawLayer::Unsupported => {}
            }
        }

        Ok(map)
    }

    fn tileset_for(&self, gid: u32) -> Option<&Tileset> {
        self.tilesets.iter().rev().find(|t| t.first_gid <= gid)
    }

    fn resolve(&self, gid: u32) -> Option<Tile> {
        let gid = gid & !FLIP_FLAGS;
        if gid == 0 {
            return None;
        }
        let (index, properties) = match self.tileset_for(gid) {
            Some(ts) => {
                let index = gid - ts.first_gid;
                (index, ts.tile_properties.get(&index).cloned().unwrap_or_default())
            }
            None => (gid, Properties::default()),
        };
        Some(Tile {
            gid,
            index,
            collides: false,
            properties,
        })
    }

    pub fn tile_layer(&self, name: &str) -> Option<&TileLayer> {
        self.tile_layers.iter().find(|l| l.name == name)
    }

    pub fn tile_layer_mut(&mut self, name: &str) -> Option<&mut TileLayer> {
        self.tile_layers.iter_mut().find(|l| l.name == name)
    }

    pub fn object_layer(&self, name: &str) -> Option<&ObjectLayer> {
        self.object_layers.iter().find(|l| l.name == name)
    }

    pub fn objects_named<'a>(
        &'a self,
        layer: &str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a MapObject> + 'a {
        self.object_layer(layer)
            .into_iter()
            .flat_map(|l| l.objects.iter())
            .filter(move |o| o.name == name)
    }

    pub fn pixel_size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32) * self.tile_size
    }

    pub fn world_to_tile(&self, pos: Vec2) -> IVec2 {
        IVec2::new(
            (pos.x / self.tile_size.x).floor() as i32,
            (-pos.y / self.tile_size.y).floor() as i32,
        )
    }

    pub fn tile_center(&self, col: i32, row: i32) -> Vec2 {
        map_to_world(Vec2::new(
            (col as f32 + 0.5) * self.tile_size.x,
            (row as f32 + 0.5) * self.tile_size.y,
        ))
    }

    pub fn tile_at_world(&self, layer: &str, pos: Vec2) -> Option<&Tile> {
        let cell = self.world_to_tile(pos);
        self.tile_layer(layer)?.tile_at(cell.x, cell.y)
    }
}

#[derive(Asset, TypePath, Debug)]
pub struct TiledMap {
    pub map: LevelMap,
}

#[derive(Default)]
pub struct TiledMapLoader;

impl AssetLoader for TiledMapLoader {
    type Asset = TiledMap;
    type Settings = ();
    type Error = TiledMapLoaderError;

    async fn load<'a>(
        &'a self,
        reader: &'a mut Reader<'_>,
        _settings: &'a (),
        load_context: &'a mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        let map = LevelMap::from_json(&bytes)?;
        let tilesets: Vec<&str> = map.tilesets.iter().map(|t| t.name.as_str()).collect();
        debug!(
            "parsed {:?}: {}x{} tiles, {} tile layers, {} object layers, tilesets {:?}",
            load_context.path(),
            map.width,
            map.height,
            map.tile_layers.len(),
            map.object_layers.len(),
            tilesets
        );
        Ok(TiledMap { map })
    }

    fn extensions(&self) -> &[&str] {
        &["tmj", "json"]
    }
}

pub struct TilemapPlugin;
impl Plugin for TilemapPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<TiledMap>()
            .init_asset_loader::<TiledMapLoader>();
    }
}

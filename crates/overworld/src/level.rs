//! XML level asset loader.
//!
//! A level file describes a glyph palette, one or more terrain layers drawn
//! as text rows, and optional trigger and object placements:
//!
//! ```xml
//! <Level name="cave">
//!   <Palette>
//!     <Tile glyph="#" blocking="true"/>
//!     <Tile glyph="~" modifier="slide"/>
//!     <Tile glyph="v" modifier="jump" entry="down" elevationDelta="-1"/>
//!   </Palette>
//!   <Layer elevation="0">
//!     <Row>#####</Row>
//!     <Row>#.~.#</Row>
//!   </Layer>
//!   <Triggers>
//!     <Trigger x="1" y="0" phase="enter" action="warp" target="4,4,0" once="true"/>
//!   </Triggers>
//!   <Objects>
//!     <Object kind="sign" label="Welcome"><At x="2" y="1"/></Object>
//!   </Objects>
//! </Level>
//! ```
//!
//! The first row of a layer is its highest y. A space glyph leaves the cell
//! without a classification.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use tracing::debug;

use crate::grid::{Direction, TileCoord};
use crate::terrain::{TerrainClassification, TerrainMap};
use crate::triggers::{TileTrigger, TriggerAction, TriggerPhase};

const EMPTY_GLYPH: char = ' ';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    MissingAttribute,
    MissingElement,
    InvalidValue,
    DuplicateGlyph,
    UnknownGlyph,
    RowLengthMismatch,
}

#[derive(Debug, Clone)]
pub struct LevelLoadError {
    pub code: LevelErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for LevelLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for LevelLoadError {}

/// A level object to be instantiated by the game. `tiles` holds its footprint
/// in authoring order; the first entry is the anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPlacement {
    pub kind: String,
    pub label: String,
    pub tiles: Vec<TileCoord>,
}

#[derive(Debug, Clone)]
pub struct LevelData {
    pub name: String,
    pub terrain: TerrainMap,
    pub triggers: Vec<TileTrigger>,
    pub objects: Vec<ObjectPlacement>,
    pub width: u32,
    pub height: u32,
    /// Elevations in file order.
    pub layers: Vec<i32>,
}

pub fn load_level(path: &Path) -> Result<LevelData, LevelLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LevelLoadError {
        code: LevelErrorCode::ReadFile,
        message: format!("failed to read level file: {source}"),
        file_path: path.to_path_buf(),
        location: None,
    })?;
    parse_level(path, &raw)
}

pub fn parse_level(path: &Path, raw: &str) -> Result<LevelData, LevelLoadError> {
    let doc = Document::parse(raw).map_err(|error| LevelLoadError {
        code: LevelErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let parser = LevelParser {
        file_path: path,
        doc: &doc,
    };
    let level = parser.parse()?;
    debug!(
        level = %level.name,
        path = %path.display(),
        tiles = level.terrain.len(),
        triggers = level.triggers.len(),
        objects = level.objects.len(),
        "level_parsed"
    );
    Ok(level)
}

struct LevelParser<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl<'a, 'input> LevelParser<'a, 'input> {
    fn parse(&self) -> Result<LevelData, LevelLoadError> {
        let root = self.doc.root_element();
        if root.tag_name().name() != "Level" {
            return Err(self.error_at(
                LevelErrorCode::InvalidRoot,
                "root element must be <Level>".to_string(),
                root,
            ));
        }
        let name: String = self.required_attr(root, "name")?;

        let mut palette = HashMap::<char, TerrainClassification>::new();
        let mut level = LevelData {
            name,
            terrain: TerrainMap::new(),
            triggers: Vec::new(),
            objects: Vec::new(),
            width: 0,
            height: 0,
            layers: Vec::new(),
        };

        for child in root.children().filter(|node| node.is_element()) {
            match child.tag_name().name() {
                "Palette" => self.parse_palette(child, &mut palette)?,
                "Layer" => self.parse_layer(child, &palette, &mut level)?,
                "Triggers" => {
                    for node in self.elements(child, "Trigger")? {
                        level.triggers.push(self.parse_trigger(node)?);
                    }
                }
                "Objects" => {
                    for node in self.elements(child, "Object")? {
                        level.objects.push(self.parse_object(node)?);
                    }
                }
                other => {
                    return Err(self.error_at(
                        LevelErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Level>"),
                        child,
                    ))
                }
            }
        }

        if level.layers.is_empty() {
            return Err(self.error_at(
                LevelErrorCode::MissingElement,
                "level needs at least one <Layer>".to_string(),
                root,
            ));
        }
        Ok(level)
    }

    fn parse_palette(
        &self,
        node: Node<'_, '_>,
        palette: &mut HashMap<char, TerrainClassification>,
    ) -> Result<(), LevelLoadError> {
        for tile in self.elements(node, "Tile")? {
            let glyph_text: String = self.required_attr(tile, "glyph")?;
            let mut chars = glyph_text.chars();
            let glyph = match (chars.next(), chars.next()) {
                (Some(glyph), None) if glyph != EMPTY_GLYPH => glyph,
                _ => {
                    return Err(self.error_at(
                        LevelErrorCode::InvalidValue,
                        format!("glyph '{glyph_text}' must be a single non-space character"),
                        tile,
                    ))
                }
            };
            let classification = TerrainClassification {
                blocking: self.optional_attr(tile, "blocking")?.unwrap_or(false),
                modifier: self.optional_attr(tile, "modifier")?.unwrap_or_default(),
                elevation_delta: self.optional_attr(tile, "elevationDelta")?.unwrap_or(0),
                entry: self.optional_attr::<Direction>(tile, "entry")?,
                damage_on_entry: self.optional_attr(tile, "damage")?.unwrap_or(0),
                collapses_on_exit: self.optional_attr(tile, "collapses")?.unwrap_or(false),
            };
            if palette.insert(glyph, classification).is_some() {
                return Err(self.error_at(
                    LevelErrorCode::DuplicateGlyph,
                    format!("glyph '{glyph}' is defined more than once"),
                    tile,
                ));
            }
        }
        Ok(())
    }

    fn parse_layer(
        &self,
        node: Node<'_, '_>,
        palette: &HashMap<char, TerrainClassification>,
        level: &mut LevelData,
    ) -> Result<(), LevelLoadError> {
        let elevation: i32 = self.optional_attr(node, "elevation")?.unwrap_or(0);
        let rows = self.elements(node, "Row")?;
        let height = rows.len();
        let mut width: Option<usize> = None;

        for (index, row) in rows.iter().enumerate() {
            let text = row.text().unwrap_or_default();
            let row_width = text.chars().count();
            match width {
                None => width = Some(row_width),
                Some(expected) if expected != row_width => {
                    return Err(self.error_at(
                        LevelErrorCode::RowLengthMismatch,
                        format!("row is {row_width} glyphs wide; earlier rows are {expected}"),
                        *row,
                    ))
                }
                Some(_) => {}
            }

            let y = (height - 1 - index) as i32;
            for (x, glyph) in text.chars().enumerate() {
                if glyph == EMPTY_GLYPH {
                    continue;
                }
                let Some(classification) = palette.get(&glyph) else {
                    return Err(self.error_at(
                        LevelErrorCode::UnknownGlyph,
                        format!("glyph '{glyph}' at column {x} is not in the <Palette>"),
                        *row,
                    ));
                };
                level
                    .terrain
                    .set(TileCoord::new(x as i32, y, elevation), *classification);
            }
        }

        level.width = level.width.max(width.unwrap_or(0) as u32);
        level.height = level.height.max(height as u32);
        level.layers.push(elevation);
        Ok(())
    }

    fn parse_trigger(&self, node: Node<'_, '_>) -> Result<TileTrigger, LevelLoadError> {
        let tile = self.tile_attrs(node)?;
        let phase = match self.required_attr::<String>(node, "phase")?.as_str() {
            "enter" => TriggerPhase::Enter,
            "exit" => TriggerPhase::Exit,
            "interact" => TriggerPhase::Interact,
            other => {
                return Err(self.error_at(
                    LevelErrorCode::InvalidValue,
                    format!("invalid phase '{other}'; allowed values: enter, exit, interact"),
                    node,
                ))
            }
        };
        let action = match self.required_attr::<String>(node, "action")?.as_str() {
            "warp" => {
                let raw: String = self.required_attr(node, "target")?;
                let target = parse_coord_list(&raw).ok_or_else(|| {
                    self.error_at(
                        LevelErrorCode::InvalidValue,
                        format!("warp target '{raw}' must be 'x,y' or 'x,y,elevation'"),
                        node,
                    )
                })?;
                TriggerAction::Warp { target }
            }
            "message" => TriggerAction::Message {
                text: self.required_attr(node, "text")?,
            },
            "script" => TriggerAction::Script {
                name: self.required_attr(node, "name")?,
            },
            other => {
                return Err(self.error_at(
                    LevelErrorCode::InvalidValue,
                    format!("invalid action '{other}'; allowed values: warp, message, script"),
                    node,
                ))
            }
        };

        Ok(TileTrigger {
            tile,
            phase,
            direction: self.optional_attr(node, "direction")?,
            action,
            once: self.optional_attr(node, "once")?.unwrap_or(false),
        })
    }

    fn parse_object(&self, node: Node<'_, '_>) -> Result<ObjectPlacement, LevelLoadError> {
        let kind: String = self.required_attr(node, "kind")?;
        let label = self.optional_attr(node, "label")?.unwrap_or_else(|| kind.clone());
        let tiles = self
            .elements(node, "At")?
            .into_iter()
            .map(|at| self.tile_attrs(at))
            .collect::<Result<Vec<_>, _>>()?;
        if tiles.is_empty() {
            return Err(self.error_at(
                LevelErrorCode::MissingElement,
                format!("object '{label}' needs at least one <At>"),
                node,
            ));
        }
        Ok(ObjectPlacement { kind, label, tiles })
    }

    fn tile_attrs(&self, node: Node<'_, '_>) -> Result<TileCoord, LevelLoadError> {
        Ok(TileCoord::new(
            self.required_attr(node, "x")?,
            self.required_attr(node, "y")?,
            self.optional_attr(node, "elevation")?.unwrap_or(0),
        ))
    }

    /// Element children of `node`, all of which must be `<expected>`.
    fn elements<'n, 'i>(
        &self,
        node: Node<'n, 'i>,
        expected: &str,
    ) -> Result<Vec<Node<'n, 'i>>, LevelLoadError> {
        let mut found = Vec::new();
        for child in node.children().filter(|child| child.is_element()) {
            if child.tag_name().name() != expected {
                return Err(self.error_at(
                    LevelErrorCode::UnknownElement,
                    format!(
                        "unknown element <{}> in <{}>; expected <{expected}>",
                        child.tag_name().name(),
                        node.tag_name().name()
                    ),
                    child,
                ));
            }
            found.push(child);
        }
        Ok(found)
    }

    fn required_attr<T: FromStr>(&self, node: Node<'_, '_>, name: &str) -> Result<T, LevelLoadError> {
        match self.optional_attr(node, name)? {
            Some(value) => Ok(value),
            None => Err(self.error_at(
                LevelErrorCode::MissingAttribute,
                format!(
                    "missing required attribute '{name}' on <{}>",
                    node.tag_name().name()
                ),
                node,
            )),
        }
    }

    fn optional_attr<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
    ) -> Result<Option<T>, LevelLoadError> {
        let Some(raw) = node.attribute(name) else {
            return Ok(None);
        };
        raw.trim().parse::<T>().map(Some).map_err(|_| {
            self.error_at(
                LevelErrorCode::InvalidValue,
                format!(
                    "attribute '{name}' on <{}> has invalid value '{raw}'",
                    node.tag_name().name()
                ),
                node,
            )
        })
    }

    fn error_at(&self, code: LevelErrorCode, message: String, node: Node<'_, '_>) -> LevelLoadError {
        let pos = self.doc.text_pos_at(node.range().start);
        LevelLoadError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }
}

fn parse_coord_list(raw: &str) -> Option<TileCoord> {
    let parts = raw
        .split(',')
        .map(|part| part.trim().parse::<i32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [x, y] => Some(TileCoord::new(*x, *y, 0)),
        [x, y, elevation] => Some(TileCoord::new(*x, *y, *elevation)),
        _ => None,
    }
}

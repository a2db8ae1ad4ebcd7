//! GML geometry decoding
//!
//! A [`GeometryCodec`] turns a GML geometry subtree into well-known text
//! and an SRID. Decoding failures yield `None`, never an error, so that a
//! bad geometry leaves its column null instead of aborting a build.
//!
//! [`GmlGeometryCodec`] handles the GML 2/3 geometries found in feature
//! data: points, line strings, rings, curves with line string segments,
//! polygons, surfaces with polygon patches, the multi-geometries and
//! geometry collections. Coordinates come from `pos`, `posList`,
//! `coordinates` or `coord`; axis order is kept as written.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::documents::Element;

/// Decoder from a GML geometry element to (WKT, SRID)
pub trait GeometryCodec: Send + Sync {
    /// Decode `element`; `None` when it is not a readable geometry
    fn decode(&self, element: &Element) -> Option<(String, i32)>;
}

impl<F> GeometryCodec for F
where
    F: Fn(&Element) -> Option<(String, i32)> + Send + Sync,
{
    fn decode(&self, element: &Element) -> Option<(String, i32)> {
        self(element)
    }
}

static TRAILING_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*$").expect("valid regex"));

/// WKT type name for a GML geometry element's local name
pub fn wkt_type(local_name: &str) -> &'static str {
    match local_name {
        "Point" => "POINT",
        "LineString" | "LinearRing" | "Curve" | "OrientableCurve" => "LINESTRING",
        "Polygon" | "Surface" | "PolygonPatch" => "POLYGON",
        "MultiPoint" => "MULTIPOINT",
        "MultiLineString" | "MultiCurve" => "MULTILINESTRING",
        "MultiPolygon" | "MultiSurface" => "MULTIPOLYGON",
        "MultiGeometry" => "GEOMETRYCOLLECTION",
        _ => "GEOMETRY",
    }
}

/// EPSG code from the first `srsName` on the geometry or its descendants
///
/// The code is the trailing integer of the URI or URN, e.g.
/// `urn:ogc:def:crs:EPSG::25832` or `http://www.opengis.net/def/crs/EPSG/0/4258`.
pub fn srid(element: &Element) -> Option<i32> {
    element
        .descendants()
        .into_iter()
        .find_map(|e| e.get_attribute("srsName"))
        .and_then(|name| TRAILING_CODE.captures(name))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Coordinate dimension from the first `srsDimension` on the geometry or its descendants
pub fn srs_dimension(element: &Element) -> Option<u8> {
    element
        .descendants()
        .into_iter()
        .find_map(|e| e.get_attribute("srsDimension"))
        .and_then(|d| d.trim().parse().ok())
        .filter(|d| (2..=3).contains(d))
}

/// Built-in GML to WKT codec
#[derive(Debug, Clone)]
pub struct GmlGeometryCodec {
    default_srid: i32,
}

impl GmlGeometryCodec {
    /// Codec assigning `default_srid` to geometries without `srsName`
    pub fn new(default_srid: i32) -> Self {
        Self { default_srid }
    }
}

impl Default for GmlGeometryCodec {
    fn default() -> Self {
        Self::new(4326)
    }
}

impl GeometryCodec for GmlGeometryCodec {
    fn decode(&self, element: &Element) -> Option<(String, i32)> {
        let dimension = srs_dimension(element).unwrap_or(2) as usize;
        let wkt = to_wkt(element, dimension)?;
        Some((wkt, srid(element).unwrap_or(self.default_srid)))
    }
}

type Coords = Vec<Vec<f64>>;

fn to_wkt(element: &Element, dimension: usize) -> Option<String> {
    let z = if dimension == 3 { " Z" } else { "" };
    let wkt = match element.local_name() {
        "Point" => format!("POINT{} ({})", z, format_coord(point(element, dimension)?.as_slice())),
        "LineString" | "LinearRing" | "Curve" | "OrientableCurve" => {
            format!("LINESTRING{} {}", z, format_sequence(&line(element, dimension)?))
        }
        "Polygon" | "Surface" | "PolygonPatch" => {
            format!("POLYGON{} {}", z, format_polygon(&polygon(element, dimension)?))
        }
        "MultiPoint" => {
            let points = members(element, &["Point"])
                .map(|p| point(p, dimension))
                .collect::<Option<Vec<_>>>()?;
            let body = points.iter().map(|p| format!("({})", format_coord(p))).collect::<Vec<_>>();
            format!("MULTIPOINT{} ({})", z, non_empty(body)?.join(", "))
        }
        "MultiLineString" | "MultiCurve" => {
            let lines = members(element, &["LineString", "Curve", "LinearRing", "OrientableCurve"])
                .map(|l| line(l, dimension))
                .collect::<Option<Vec<_>>>()?;
            let body = lines.iter().map(|l| format_sequence(l)).collect::<Vec<_>>();
            format!("MULTILINESTRING{} ({})", z, non_empty(body)?.join(", "))
        }
        "MultiPolygon" | "MultiSurface" => {
            let polygons = members(element, &["Polygon", "Surface"])
                .map(|p| polygon(p, dimension))
                .collect::<Option<Vec<_>>>()?;
            let body = polygons.iter().map(|p| format_polygon(p)).collect::<Vec<_>>();
            format!("MULTIPOLYGON{} ({})", z, non_empty(body)?.join(", "))
        }
        "MultiGeometry" => {
            let parts = element
                .children
                .iter()
                .flat_map(|member| member.children.iter())
                .map(|g| to_wkt(g, dimension))
                .collect::<Option<Vec<_>>>()?;
            format!("GEOMETRYCOLLECTION ({})", non_empty(parts)?.join(", "))
        }
        _ => return None,
    };
    Some(wkt)
}

fn non_empty(parts: Vec<String>) -> Option<Vec<String>> {
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Geometries of the given kinds held by member properties of a multi-geometry
fn members<'e>(element: &'e Element, kinds: &'e [&'e str]) -> impl Iterator<Item = &'e Element> {
    element
        .children
        .iter()
        .flat_map(|member| member.children.iter())
        .filter(move |g| kinds.contains(&g.local_name()))
}

fn point(element: &Element, dimension: usize) -> Option<Vec<f64>> {
    let mut coords = coordinates(element, dimension)?;
    if coords.len() != 1 {
        return None;
    }
    coords.pop()
}

fn line(element: &Element, dimension: usize) -> Option<Coords> {
    let coords = coordinates(element, dimension)?;
    if coords.len() < 2 {
        return None;
    }
    Some(coords)
}

/// Exterior ring followed by interior rings
fn polygon(element: &Element, dimension: usize) -> Option<Vec<Coords>> {
    if element.local_name() == "Surface" {
        let patch = element.descendants().into_iter().find(|e| e.local_name() == "PolygonPatch")?;
        return polygon(patch, dimension);
    }

    let exterior = element
        .find_children("exterior")
        .chain(element.find_children("outerBoundaryIs"))
        .next()?;
    let interiors = element.find_children("interior").chain(element.find_children("innerBoundaryIs"));
    let mut rings = Vec::new();
    for ring in std::iter::once(exterior).chain(interiors) {
        let coords = coordinates(ring, dimension)?;
        if coords.len() < 4 {
            return None;
        }
        rings.push(coords);
    }
    Some(rings)
}

/// All coordinate tuples below `element`, in document order
fn coordinates(element: &Element, dimension: usize) -> Option<Coords> {
    let mut out = Vec::new();
    for node in element.descendants() {
        match node.local_name() {
            "pos" | "posList" => {
                let dim = node
                    .get_attribute("srsDimension")
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(dimension);
                let values = parse_numbers(node.text()?.split_whitespace())?;
                if dim == 0 || values.len() % dim != 0 {
                    return None;
                }
                out.extend(values.chunks(dim).map(<[f64]>::to_vec));
            }
            "coordinates" => {
                let cs = node.get_attribute("cs").unwrap_or(",");
                let decimal = node.get_attribute("decimal").unwrap_or(".");
                let text = node.text()?;
                let tuples: Vec<&str> = match node.get_attribute("ts") {
                    Some(ts) if !ts.trim().is_empty() => text.split(ts).collect(),
                    _ => text.split_whitespace().collect(),
                };
                for tuple in tuples.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    let normalized = tuple.replace(decimal, ".");
                    out.push(parse_numbers(normalized.split(cs))?);
                }
            }
            "coord" => {
                let axes = ["X", "Y", "Z"]
                    .iter()
                    .filter_map(|axis| node.find_children(axis).next())
                    .map(|e| e.text().and_then(|t| t.trim().parse().ok()))
                    .collect::<Option<Vec<f64>>>()?;
                out.push(axes);
            }
            _ => {}
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn parse_numbers<'t>(values: impl Iterator<Item = &'t str>) -> Option<Vec<f64>> {
    values.map(|v| v.trim().parse::<f64>().ok()).collect()
}

fn format_coord(coord: &[f64]) -> String {
    coord.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

fn format_sequence(coords: &Coords) -> String {
    format!("({})", coords.iter().map(|c| format_coord(c)).collect::<Vec<_>>().join(", "))
}

fn format_polygon(rings: &[Coords]) -> String {
    format!("({})", rings.iter().map(format_sequence).collect::<Vec<_>>().join(", "))
}

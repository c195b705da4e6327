use geo::algorithm::bounding_rect::BoundingRect;
use geo::{CoordsIter, Geometry, Rect};
use serde_json::{Map, Value};

/// One record of a vector dataset: an optional geometry plus its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Option<Geometry<f64>>, properties: Map<String, Value>) -> Self {
        Self {
            geometry,
            properties,
        }
    }
}

/// The in-memory dataset passed between engine steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().filter_map(|f| f.geometry.as_ref())
    }

    /// Apply a fallible transformation to every geometry, keeping attributes.
    pub fn try_map_geometries<E>(
        self,
        mut f: impl FnMut(Geometry<f64>) -> Result<Geometry<f64>, E>,
    ) -> Result<Self, E> {
        let features = self
            .features
            .into_iter()
            .map(|feature| {
                let geometry = feature.geometry.map(&mut f).transpose()?;
                Ok(Feature::new(geometry, feature.properties))
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self { features })
    }

    /// Bounding box over every geometry, or `None` when nothing has extent.
    pub fn extent(&self) -> Option<Rect<f64>> {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        let mut any = false;

        for bbox in self.geometries().filter_map(|g| g.bounding_rect()) {
            min_x = min_x.min(bbox.min().x);
            min_y = min_y.min(bbox.min().y);
            max_x = max_x.max(bbox.max().x);
            max_y = max_y.max(bbox.max().y);
            any = true;
        }

        any.then(|| Rect::new((min_x, min_y), (max_x, max_y)))
    }

    pub fn vertex_count(&self) -> usize {
        self.geometries().map(|g| g.coords_count()).sum()
    }

    /// Union of attribute names in order of first appearance.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for feature in &self.features {
            for key in feature.properties.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point};
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn extent_covers_all_geometries() {
        let set = FeatureSet::new(vec![
            Feature::new(Some(point!(x: 1.0, y: 2.0).into()), Map::new()),
            Feature::new(
                Some(line_string![(x: -3.0, y: 0.0), (x: 4.0, y: 5.0)].into()),
                Map::new(),
            ),
            Feature::new(None, Map::new()),
        ]);
        let extent = set.extent().unwrap();
        assert_eq!(extent.min().x, -3.0);
        assert_eq!(extent.min().y, 0.0);
        assert_eq!(extent.max().x, 4.0);
        assert_eq!(extent.max().y, 5.0);
        assert_eq!(set.vertex_count(), 3);
    }

    #[test]
    fn empty_set_has_no_extent() {
        assert!(FeatureSet::default().extent().is_none());
    }

    #[test]
    fn attribute_names_are_unioned() {
        let set = FeatureSet::new(vec![
            Feature::new(None, props(json!({"name": "a", "pop": 1}))),
            Feature::new(None, props(json!({"name": "b", "kind": "x"}))),
        ]);
        assert_eq!(set.attribute_names(), vec!["name", "pop", "kind"]);
    }

    #[test]
    fn map_keeps_attributes() {
        let set = FeatureSet::new(vec![Feature::new(
            Some(point!(x: 1.0, y: 1.0).into()),
            props(json!({"id": 7})),
        )]);
        let moved = set
            .try_map_geometries(|g| match g {
                Geometry::Point(p) => Ok::<_, ()>(Geometry::Point(geo::Point::new(p.x() + 1.0, p.y()))),
                other => Ok(other),
            })
            .unwrap();
        assert_eq!(moved.features[0].properties["id"], json!(7));
        assert_eq!(
            moved.features[0].geometry,
            Some(point!(x: 2.0, y: 1.0).into())
        );
    }
}

use ndarray::{Array2, Array3, s};

/// Pixel values of one slice. FITS slices keep floating point data,
/// DICOM slices are always integer.
#[derive(Clone, Debug, PartialEq)]
pub enum SliceImage {
    Integer(Array2<i32>),
    Float(Array2<f64>),
}

impl SliceImage {
    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        match self {
            SliceImage::Integer(image) => image.dim(),
            SliceImage::Float(image) => image.dim(),
        }
    }

    /// The image upside down.
    pub fn flipped(&self) -> Self {
        match self {
            SliceImage::Integer(image) => SliceImage::Integer(image.slice(s![..;-1, ..]).to_owned()),
            SliceImage::Float(image) => SliceImage::Float(image.slice(s![..;-1, ..]).to_owned()),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SliceImage::Float(_))
    }

    fn to_float(&self) -> Array2<f64> {
        match self {
            SliceImage::Integer(image) => image.mapv(f64::from),
            SliceImage::Float(image) => image.clone(),
        }
    }
}

impl From<Array2<i32>> for SliceImage {
    fn from(image: Array2<i32>) -> Self {
        SliceImage::Integer(image)
    }
}

impl From<Array2<f64>> for SliceImage {
    fn from(image: Array2<f64>) -> Self {
        SliceImage::Float(image)
    }
}

/// Stacked slices, `(slices, height, width)`.
#[derive(Clone, Debug, PartialEq)]
pub enum Voxels {
    Integer(Array3<i32>),
    Float(Array3<f64>),
}

impl Voxels {
    /// Stack equally sized slices. One floating point slice makes the whole
    /// stack floating point.
    ///
    /// # Panics
    ///
    /// Panics if `slices` is empty or the slices differ in shape.
    pub fn stack(slices: &[SliceImage]) -> Self {
        let (height, width) = slices[0].dim();
        let depth = slices.len();

        if slices.iter().any(SliceImage::is_float) {
            let mut data = Array3::<f64>::zeros((depth, height, width));
            for (i, slice) in slices.iter().enumerate() {
                data.slice_mut(s![i, .., ..]).assign(&slice.to_float());
            }
            return Voxels::Float(data);
        }

        let mut data = Array3::<i32>::zeros((depth, height, width));
        for (i, slice) in slices.iter().enumerate() {
            if let SliceImage::Integer(image) = slice {
                data.slice_mut(s![i, .., ..]).assign(image);
            }
        }
        Voxels::Integer(data)
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Voxels::Integer(data) => data.dim(),
            Voxels::Float(data) => data.dim(),
        }
    }
}

impl From<Array3<i32>> for Voxels {
    fn from(data: Array3<i32>) -> Self {
        Voxels::Integer(data)
    }
}

impl From<Array3<f64>> for Voxels {
    fn from(data: Array3<f64>) -> Self {
        Voxels::Float(data)
    }
}

/// A patient's slices stacked along the leading axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Cube {
    pub voxels: Voxels,
    /// Extension name written as `EXTNAME`
    pub name: Option<String>,
    /// (column, row, slice) spacing in millimetres, when the slices carry it
    pub spacing: Option<(f32, f32, f32)>,
}

impl Cube {
    pub fn new(voxels: impl Into<Voxels>) -> Self {
        Self {
            voxels: voxels.into(),
            name: None,
            spacing: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_spacing(mut self, spacing: Option<(f32, f32, f32)>) -> Self {
        self.spacing = spacing;
        self
    }

    /// Get the dimensions of the cube (slices, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.voxels.dim()
    }

    pub fn voxels(&self) -> &Voxels {
        &self.voxels
    }

    pub fn slice_count(&self) -> usize {
        self.dim().0
    }

    /// A copy of slice `index`.
    pub fn slice(&self, index: usize) -> Option<SliceImage> {
        if index >= self.slice_count() {
            return None;
        }
        Some(match &self.voxels {
            Voxels::Integer(data) => SliceImage::Integer(data.slice(s![index, .., ..]).to_owned()),
            Voxels::Float(data) => SliceImage::Float(data.slice(s![index, .., ..]).to_owned()),
        })
    }
}

#![allow(dead_code)]

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_cube::SliceImage;
use dicom_dictionary_std::{tags, uids};
use ndarray::Array2;
use std::{fs, path::Path};

/// A `rows x columns` image whose pixels encode their slice and position.
pub fn test_image(slice: i16, rows: usize, columns: usize) -> Array2<i16> {
    Array2::from_shape_fn((rows, columns), |(r, c)| {
        slice * 1000 + (r * columns + c) as i16 - 50
    })
}

/// Write a signed 16-bit, single frame CT slice.
pub fn write_dicom_slice(path: impl AsRef<Path>, image: &Array2<i16>) {
    let (rows, columns) = image.dim();
    let pixel_bytes: Vec<u8> = image.iter().flat_map(|v| v.to_le_bytes()).collect();
    let instance_uid = "1.2.826.0.1.3680043.2.1125.1.1";

    let object = InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
        ),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(instance_uid)),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows as u16)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns as u16)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::from(pixel_bytes)),
    ]);

    let file = object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(instance_uid),
        )
        .unwrap();
    file.write_to_file(path).unwrap();
}

/// Write `count` slices into `folder` as `IM.<k>.dcm` and return the images,
/// indexed by slice position.
pub fn write_patient(folder: impl AsRef<Path>, count: usize, rows: usize, columns: usize) -> Vec<Array2<i16>> {
    let folder = folder.as_ref();
    fs::create_dir_all(folder).unwrap();
    (1..=count)
        .map(|k| {
            let image = test_image(k as i16, rows, columns);
            write_dicom_slice(folder.join(format!("IM.{k}.dcm")), &image);
            image
        })
        .collect()
}

/// The image as stacked in a cube: rows reversed, widened to `i32`.
pub fn flipped(image: &Array2<i16>) -> SliceImage {
    SliceImage::Integer(image.slice(ndarray::s![..;-1, ..]).mapv(i32::from))
}

//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the ModelPixelScale and
//! ModelTiepoint tags; the CRS travels as an EPSG code in the GeoKey
//! directory, and nodata in the GDAL_NODATA ASCII tag. Cells are stored in
//! the sample format of the raster's element type.

use super::{write_staged, WriteOptions};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement, SampleType};
use num_traits::{NumCast, ToPrimitive};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{
    ColorType, Gray16, Gray32, Gray32Float, Gray64, Gray64Float, Gray8, GrayI16, GrayI32, GrayI64, GrayI8,
};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKindStandard, TiffValue};
use tiff::tags::Tag;
use tracing::{info, warn};

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let raster = decode_geotiff(File::open(path)?)
        .map_err(|e| match e {
            Error::Io(_) => e,
            other => Error::parse(path.display(), other.to_string()),
        })?;
    info!(
        "loaded raster {} ({} x {}, CRS {})",
        path.display(),
        raster.cols(),
        raster.rows(),
        raster.crs().map(|c| c.to_string()).unwrap_or_else(|| "undefined".into())
    );
    Ok(raster)
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Tiff(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Tiff(format!("cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let transform = read_geotransform(&mut decoder).unwrap_or_default();
    let crs = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .ok()
        .and_then(|keys| crs_from_geokeys(&keys));
    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok())
        .and_then(T::from_f64);

    let result = decoder
        .read_image()
        .map_err(|e| Error::Tiff(format!("cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => convert(&buf),
        DecodingResult::F64(buf) => convert(&buf),
        DecodingResult::U8(buf) => convert(&buf),
        DecodingResult::U16(buf) => convert(&buf),
        DecodingResult::U32(buf) => convert(&buf),
        DecodingResult::U64(buf) => convert(&buf),
        DecodingResult::I8(buf) => convert(&buf),
        DecodingResult::I16(buf) => convert(&buf),
        DecodingResult::I32(buf) => convert(&buf),
        DecodingResult::I64(buf) => convert(&buf),
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF pixel format".to_string())),
    };

    Ok(Raster::from_vec(data, rows, cols, transform, crs)?.with_nodata(nodata))
}

/// Exact cast when the value fits `T`, otherwise rounded through f64.
/// Values with no representation (NaN into an integer type) become `T`'s default nodata.
fn convert<S: ToPrimitive + NumCast + Copy, T: RasterElement>(buf: &[S]) -> Vec<T> {
    buf.iter()
        .map(|&v| {
            let exact = v.to_f64().is_some_and(|f| f.fract() == 0.0 || f.is_nan());
            let cast = if exact { <T as NumCast>::from(v) } else { None };
            cast.or_else(|| v.to_f64().and_then(T::from_f64))
                .unwrap_or_else(T::default_nodata)
        })
        .collect()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// CRS declared by a GeoKey directory.
///
/// ProjectedCSType wins when present (projected files usually also carry
/// the GeographicType of their datum); GeographicType is only used for a
/// geographic model.
fn crs_from_geokeys(keys: &[u16]) -> Option<CRS> {
    // header: version, revision, minor, key count; then 4 shorts per key
    let count = *keys.get(3)? as usize;
    let entries = keys.get(4..4 + count * 4)?;
    // inline SHORT values only (location 0)
    let value_of = |id: u16| {
        entries
            .chunks_exact(4)
            .find(|k| k[0] == id && k[1] == 0)
            .map(|k| k[3])
    };

    let code = match value_of(PROJECTED_CS_TYPE) {
        Some(code) => code,
        None if value_of(GT_MODEL_TYPE) == Some(MODEL_TYPE_GEOGRAPHIC) => value_of(GEOGRAPHIC_TYPE)?,
        None => return None,
    };
    match CRS::from_epsg(code as u32) {
        Ok(crs) => Some(crs),
        Err(e) => {
            warn!("ignoring GeoTIFF CRS: {}", e);
            None
        }
    }
}

/// Write a Raster to a GeoTIFF file.
///
/// Fails with `AlreadyExists` unless overwriting.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: &WriteOptions) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    write_staged(path, options, |staged| {
        let mut file = BufWriter::new(File::create(staged)?);
        encode_geotiff(raster, &mut file)?;
        file.flush()?;
        Ok(())
    })?;
    info!("saved raster to {}", path.display());
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(raster: &Raster<T>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn tiff_err(what: &str, e: tiff::TiffError) -> Error {
    Error::Tiff(format!("{}: {}", what, e))
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_err("TIFF encoder error", e))?;
    match T::SAMPLE_TYPE {
        SampleType::U8 => encode_image::<Gray8, _, _>(&mut encoder, raster),
        SampleType::U16 => encode_image::<Gray16, _, _>(&mut encoder, raster),
        SampleType::U32 => encode_image::<Gray32, _, _>(&mut encoder, raster),
        SampleType::U64 => encode_image::<Gray64, _, _>(&mut encoder, raster),
        SampleType::I8 => encode_image::<GrayI8, _, _>(&mut encoder, raster),
        SampleType::I16 => encode_image::<GrayI16, _, _>(&mut encoder, raster),
        SampleType::I32 => encode_image::<GrayI32, _, _>(&mut encoder, raster),
        SampleType::I64 => encode_image::<GrayI64, _, _>(&mut encoder, raster),
        SampleType::F32 => encode_image::<Gray32Float, _, _>(&mut encoder, raster),
        SampleType::F64 => encode_image::<Gray64Float, _, _>(&mut encoder, raster),
    }
}

fn encode_image<C, T, W>(encoder: &mut TiffEncoder<W>, raster: &Raster<T>) -> Result<()>
where
    C: ColorType,
    C::Inner: NumCast + Copy,
    [C::Inner]: TiffValue,
    T: RasterElement,
    W: Write + Seek,
{
    let data: Vec<C::Inner> = raster
        .data()
        .iter()
        .map(|&v| {
            <C::Inner as NumCast>::from(v).ok_or_else(|| {
                Error::UnsupportedDataType(format!("cell value {:?} does not fit the TIFF sample type", v))
            })
        })
        .collect::<Result<_>>()?;

    let (rows, cols) = raster.shape();
    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(|e| tiff_err("cannot create TIFF image", e))?;
    write_geo_tags(image.encoder(), raster)?;
    image
        .write_data(&data)
        .map_err(|e| tiff_err("cannot write image data", e))
}

fn write_geo_tags<W, T>(dir: &mut DirectoryEncoder<'_, W, TiffKindStandard>, raster: &Raster<T>) -> Result<()>
where
    W: Write + Seek,
    T: RasterElement,
{
    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| tiff_err("cannot write scale tag", e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| tiff_err("cannot write tiepoint tag", e))?;

    let geokeys = geokey_directory(raster.crs());
    dir.write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(|e| tiff_err("cannot write geokey tag", e))?;

    if let Some(nodata) = raster.nodata().and_then(|v| v.to_f64()) {
        dir.write_tag(Tag::GdalNodata, nodata.to_string().as_str())
            .map_err(|e| tiff_err("cannot write nodata tag", e))?;
    }
    Ok(())
}

/// GeoKey directory declaring the model type and, when known, the EPSG code.
fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(|c| c.epsg()).and_then(|c| u16::try_from(c).ok());
    if crs.is_some() && epsg.is_none() {
        warn!("CRS {} has no EPSG code; GeoTIFF will not carry it", crs.map(|c| c.to_string()).unwrap_or_default());
    }

    let geographic = crs.is_some_and(|c| c.is_geographic());
    let model_type = if geographic { MODEL_TYPE_GEOGRAPHIC } else { MODEL_TYPE_PROJECTED };

    let mut keys: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE, 0, 1, model_type],
        [GT_RASTER_TYPE, 0, 1, 1], // RasterPixelIsArea
    ];
    if let Some(code) = epsg {
        let key = if geographic { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };
        keys.push([key, 0, 1, code]);
    }

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    directory.extend(keys.into_iter().flatten());
    directory
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Raster<f64> {
        let data = (0..12).map(|v| v as f64).collect();
        Raster::from_vec(
            data,
            3,
            4,
            GeoTransform::from_origin(500_000.0, 4_500_000.0, 30.0),
            Some(CRS::from_epsg(32618).unwrap()),
        )
        .unwrap()
        .with_nodata(Some(0.0))
    }

    #[test]
    fn test_buffer_roundtrip_keeps_georeferencing() {
        let raster = sample();
        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32618));
        assert_relative_eq!(back.transform().origin_x, 500_000.0);
        assert_relative_eq!(back.transform().origin_y, 4_500_000.0);
        assert_relative_eq!(back.transform().pixel_height, -30.0);
        assert_relative_eq!(back.get(2, 3).unwrap(), 11.0);
        assert_eq!(back.nodata(), Some(0.0));
        assert!(back.is_nodata(back.get(0, 0).unwrap()));
    }

    #[test]
    fn test_integer_roundtrip_keeps_nodata() {
        let dem = Raster::from_vec(
            vec![-9999i16, 12, 240, -3],
            2,
            2,
            GeoTransform::from_origin(0.0, 20.0, 10.0),
            Some(CRS::from_epsg(32618).unwrap()),
        )
        .unwrap()
        .with_nodata(Some(-9999));

        let back: Raster<i16> = read_geotiff_from_buffer(&write_geotiff_to_buffer(&dem).unwrap()).unwrap();
        assert_eq!(back.nodata(), Some(-9999));
        assert_eq!(back.get(0, 0).unwrap(), -9999);
        assert_eq!(back.get(1, 1).unwrap(), -3);
        let stats = back.statistics();
        assert_eq!(stats.valid_count, 3);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn test_large_u32_values_are_exact() {
        let ids = Raster::from_vec(
            vec![16_777_217u32, 4_000_000_001],
            1,
            2,
            GeoTransform::default(),
            None,
        )
        .unwrap();
        let back: Raster<u32> = read_geotiff_from_buffer(&write_geotiff_to_buffer(&ids).unwrap()).unwrap();
        assert_eq!(back.get(0, 0).unwrap(), 16_777_217);
        assert_eq!(back.get(0, 1).unwrap(), 4_000_000_001);
        assert_eq!(back.nodata(), None);
        assert!(back.crs().is_none());
    }

    #[test]
    fn test_write_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ortho.tif");
        write_geotiff(&sample(), &path, &WriteOptions::default()).unwrap();

        let err = write_geotiff(&sample(), &path, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        write_geotiff(&sample(), &path, &WriteOptions::overwrite()).unwrap();

        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32618));
    }

    #[test]
    fn test_geokeys_for_geographic() {
        let keys = geokey_directory(Some(&CRS::wgs84()));
        assert_eq!(keys[3], 3);
        assert_eq!(&keys[4..8], &[GT_MODEL_TYPE, 0, 1, 2]);
        assert_eq!(&keys[12..16], &[GEOGRAPHIC_TYPE, 0, 1, 4326]);
        assert_eq!(crs_from_geokeys(&keys), Some(CRS::wgs84()));
    }

    #[test]
    fn test_projected_key_wins_over_datum() {
        let keys = [
            1, 1, 0, 3,
            GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED,
            GEOGRAPHIC_TYPE, 0, 1, 4326,
            PROJECTED_CS_TYPE, 0, 1, 32618,
        ];
        assert_eq!(crs_from_geokeys(&keys).and_then(|c| c.epsg()), Some(32618));

        // a geographic code on a projected model without ProjectedCSType is not guessed
        let keys = [1, 1, 0, 2, GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED, GEOGRAPHIC_TYPE, 0, 1, 4326];
        assert!(crs_from_geokeys(&keys).is_none());
    }
}

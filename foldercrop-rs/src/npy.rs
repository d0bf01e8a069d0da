//! NumPy `.npy` glue over `npyz`: 1-D or 2-D numeric arrays of any byte
//! order and layout are read as (rows, channels) `f64`; writes are `<f8`.

use ndarray::{Array2, ArrayView2};
use npyz::{DType, NpyFile, Order, WriteOptions, WriterBuilder};
use std::io::{self, Read, Write};

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn widen<T: Into<f64>>(values: Vec<T>) -> Vec<f64> {
    values.into_iter().map(Into::into).collect()
}

/// Read an array as (rows, channels). A 1-D array becomes a single channel.
///
/// The header is checked before any payload is read: more than `max_rows`
/// rows, or a shape whose payload would not fit in `source_len` bytes, is
/// refused.
pub(crate) fn read_array<R: Read>(
    reader: R,
    max_rows: usize,
    source_len: u64,
) -> io::Result<Array2<f64>> {
    let npy = NpyFile::new(reader)?;

    let descr = match npy.dtype() {
        DType::Plain(type_str) => type_str.to_string(),
        other => return Err(invalid(format!("unsupported dtype {other:?}"))),
    };
    // "<f8" -> "f8"; the byte-order marker is handled by npyz
    let code = descr.get(1..).unwrap_or_default().to_string();
    let width: u64 = code
        .get(1..)
        .and_then(|w| w.parse().ok())
        .ok_or_else(|| invalid(format!("unsupported dtype {descr:?}")))?;

    let (rows, cols) = match npy.shape() {
        [n] => (*n, 1),
        [r, c] => (*r, *c),
        dims => {
            return Err(invalid(format!(
                "expected a 1-D or 2-D array, got {} dimensions",
                dims.len()
            )))
        }
    };
    if rows > max_rows as u64 {
        return Err(invalid(format!(
            "{rows} samples exceed the limit of {max_rows}"
        )));
    }
    rows.checked_mul(cols)
        .and_then(|n| n.checked_mul(width))
        .filter(|&bytes| bytes <= source_len)
        .ok_or_else(|| {
            invalid(format!(
                "shape ({rows}, {cols}) of {descr} needs more data than the {source_len}-byte file holds"
            ))
        })?;
    let rows = usize::try_from(rows).map_err(|e| invalid(e.to_string()))?;
    let cols = usize::try_from(cols).map_err(|e| invalid(e.to_string()))?;
    let fortran = matches!(npy.order(), Order::Fortran);

    let values = match code.as_str() {
        "f8" => npy.into_vec::<f64>()?,
        "f4" => widen(npy.into_vec::<f32>()?),
        "i1" => widen(npy.into_vec::<i8>()?),
        "i2" => widen(npy.into_vec::<i16>()?),
        "i4" => widen(npy.into_vec::<i32>()?),
        "i8" => npy.into_vec::<i64>()?.into_iter().map(|v| v as f64).collect(),
        "u1" => widen(npy.into_vec::<u8>()?),
        "u2" => widen(npy.into_vec::<u16>()?),
        "u4" => widen(npy.into_vec::<u32>()?),
        "u8" => npy.into_vec::<u64>()?.into_iter().map(|v| v as f64).collect(),
        _ => return Err(invalid(format!("unsupported dtype {descr:?}"))),
    };

    let array = if fortran {
        Array2::from_shape_vec((cols, rows), values)
            .map_err(|e| invalid(e.to_string()))?
            .reversed_axes()
            .as_standard_layout()
            .into_owned()
    } else {
        Array2::from_shape_vec((rows, cols), values).map_err(|e| invalid(e.to_string()))?
    };
    Ok(array)
}

pub(crate) fn write_array<W: Write>(writer: W, data: ArrayView2<'_, f64>) -> io::Result<()> {
    let shape = [data.nrows() as u64, data.ncols() as u64];
    let mut out = WriteOptions::<f64>::new()
        .default_dtype()
        .shape(&shape)
        .writer(writer)
        .begin_nd()?;
    for value in data.iter() {
        out.push(value)?;
    }
    out.finish()
}

//! Utilities to read raster datasets and emit JSON.

use gdal::DatasetOptions;
use gdal::GdalOpenFlags;
use rasterbq::Result;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use gdal::Dataset;

pub fn read_dataset(path: &Path) -> Result<Dataset> {
    Ok(Dataset::open(&path).with_context(|| format!("reading dataset {}", path.display()))?)
}

pub fn edit_dataset(path: &Path) -> Result<Dataset> {
    Ok(Dataset::open_ex(
        &path,
        DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE,
            ..Default::default()
        },
    )
    .with_context(|| format!("editing dataset {}", path.display()))?)
}

use serde::Serialize;
pub fn write_json<T: Serialize>(path: &Path, json: &T) -> Result<()> {
    let file = File::create(path)?;
    let buf = std::io::BufWriter::with_capacity(0x100000, file);
    Ok(serde_json::to_writer(buf, json)?)
}

pub fn print_json<T: Serialize>(json: &T) -> Result<()> {
    let writer = std::io::BufWriter::new(std::io::stdout());
    Ok(serde_json::to_writer_pretty(writer, json)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use gdal::DriverManager;
    use tempdir::TempDir;

    const WIDTH: usize = 16;
    const HEIGHT: usize = 32;

    #[test]
    fn create_read_update_ds() -> Result<()> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let tmp_dir = TempDir::new("rasterbq_test").unwrap();
        let path = tmp_dir.path().join("foo.tif");

        // Create empty raster
        {
            driver.create_with_band_type::<f64, _>(&path, WIDTH as isize, HEIGHT as isize, 1)?;
        }

        // Create some data
        let data = {
            use gdal::raster::Buffer;
            let data: Vec<f64> = (0..WIDTH * HEIGHT).map(|i| (i % 251) as f64).collect();
            Buffer::new((WIDTH, HEIGHT), data)
        };

        // Write the dataset
        {
            let ds = edit_dataset(&path)?;
            let mut band = ds.rasterband(1)?;
            let (width, height) = ds.raster_size();

            assert_eq!(width, WIDTH);
            assert_eq!(height, HEIGHT);
            assert_eq!(ds.raster_count(), 1);

            band.write((0, 0), (width, height), &data)?;
        }

        // Read data
        {
            let ds = read_dataset(&path)?;
            let band = ds.rasterband(1)?;
            let rdata = band.read_band_as::<f64>()?;

            assert_eq!(rdata.data, data.data);
        }

        Ok(())
    }

    #[test]
    fn write_json_round_trips() -> Result<()> {
        let tmp_dir = TempDir::new("rasterbq_test").unwrap();
        let path = tmp_dir.path().join("out.json");
        write_json(&path, &serde_json::json!({ "bands": [1, 2] }))?;

        let text = std::fs::read_to_string(&path)?;
        let val: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(val["bands"][1], serde_json::json!(2));
        Ok(())
    }
}

//! Scalar reference kernel for ZNCC evaluation.

use crate::kernel::{Kernel, Placement};
use crate::template::TemplatePlan;
use crate::ImageView;

/// Scalar unmasked ZNCC kernel for rotation-free matching.
pub struct ZnccScalar;

impl Kernel for ZnccScalar {
    type Plan = TemplatePlan;

    fn score_at(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f32,
    ) -> f32 {
        let img_width = image.width();
        let img_height = image.height();
        let tpl_width = tpl.width();
        let tpl_height = tpl.height();

        if img_width < tpl_width || img_height < tpl_height {
            return f32::NEG_INFINITY;
        }
        if x > img_width - tpl_width || y > img_height - tpl_height {
            return f32::NEG_INFINITY;
        }

        let var_t = tpl.var_t();
        if var_t <= 1e-8 {
            return f32::NEG_INFINITY;
        }
        let t_prime = tpl.zero_mean();
        let n = (tpl_width * tpl_height) as f32;

        let mut dot = 0.0f32;
        let mut sum_i = 0.0f32;
        let mut sum_i2 = 0.0f32;

        for ty in 0..tpl_height {
            let Some(img_row) = image.row(y + ty) else {
                return f32::NEG_INFINITY;
            };
            let base = ty * tpl_width;
            for tx in 0..tpl_width {
                let value = img_row[x + tx] as f32;
                dot += t_prime[base + tx] * value;
                sum_i += value;
                sum_i2 += value * value;
            }
        }

        let var_i = sum_i2 - (sum_i * sum_i) / n;
        if var_i <= min_var_i {
            return f32::NEG_INFINITY;
        }

        let denom = (var_t * var_i).sqrt();
        let score = dot / denom;
        if score.is_finite() {
            score
        } else {
            f32::NEG_INFINITY
        }
    }

    fn scan_best(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        min_var_i: f32,
    ) -> Option<Placement> {
        if image.width() < tpl.width() || image.height() < tpl.height() {
            return None;
        }
        let max_x = image.width() - tpl.width();
        let max_y = image.height() - tpl.height();

        let mut best: Option<Placement> = None;
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = Self::score_at(image, tpl, x, y, min_var_i);
                if !score.is_finite() {
                    continue;
                }
                if best.map_or(true, |b| score > b.score) {
                    best = Some(Placement { x, y, score });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::ZnccScalar;
    use crate::kernel::Kernel;
    use crate::template::TemplatePlan;
    use crate::ImageView;

    fn textured(width: usize, height: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push((((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8);
            }
        }
        data
    }

    #[test]
    fn identical_window_scores_one() {
        let data = textured(12, 10);
        let view = ImageView::from_slice(&data, 12, 10).unwrap();
        let plan = TemplatePlan::from_view(view).unwrap();
        let score = ZnccScalar::score_at(view, &plan, 0, 0, 1e-6);
        assert!((score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn inverted_window_scores_minus_one() {
        let data = textured(8, 8);
        let inverted: Vec<u8> = data.iter().map(|v| 255 - v).collect();
        let plan = TemplatePlan::from_view(ImageView::from_slice(&data, 8, 8).unwrap()).unwrap();
        let view = ImageView::from_slice(&inverted, 8, 8).unwrap();
        let score = ZnccScalar::score_at(view, &plan, 0, 0, 1e-6);
        assert!((score + 1.0).abs() < 1e-4);
    }

    #[test]
    fn flat_window_is_rejected() {
        let data = textured(6, 6);
        let plan = TemplatePlan::from_view(ImageView::from_slice(&data, 6, 6).unwrap()).unwrap();
        let flat = vec![40u8; 36];
        let view = ImageView::from_slice(&flat, 6, 6).unwrap();
        assert_eq!(ZnccScalar::score_at(view, &plan, 0, 0, 1e-6), f32::NEG_INFINITY);
    }

    #[test]
    fn scan_finds_embedded_patch() {
        let img_w = 24;
        let img_h = 20;
        let image = textured(img_w, img_h);
        let mut patch = Vec::new();
        for y in 5..11 {
            patch.extend_from_slice(&image[y * img_w + 7..y * img_w + 15]);
        }
        let plan = TemplatePlan::from_view(ImageView::from_slice(&patch, 8, 6).unwrap()).unwrap();
        let view = ImageView::from_slice(&image, img_w, img_h).unwrap();
        let best = ZnccScalar::scan_best(view, &plan, 1e-6).unwrap();
        assert_eq!((best.x, best.y), (7, 5));
        assert!(best.score > 0.999);
    }

    #[test]
    fn scan_rejects_oversized_template() {
        let tpl = textured(10, 10);
        let plan = TemplatePlan::from_view(ImageView::from_slice(&tpl, 10, 10).unwrap()).unwrap();
        let small = textured(4, 4);
        let view = ImageView::from_slice(&small, 4, 4).unwrap();
        assert!(ZnccScalar::scan_best(view, &plan, 1e-6).is_none());
    }
}

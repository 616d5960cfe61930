pub mod blob_detector;
pub mod calibrator;
pub mod color_mask;
pub mod detector;
pub mod goal;
pub mod hand;
pub mod homography;
pub mod kinematics;
pub mod pixel;
pub mod smart_blob;
pub mod tracker;

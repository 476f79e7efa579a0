mod detections;
mod recordings;

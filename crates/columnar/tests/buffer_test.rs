//! Integration tests for buffers backed by files and row views over them.

use alopex_columnar::storage::BufferKind;
use alopex_columnar::{Buffer, RowIndex};
use tempfile::TempDir;

#[test]
fn test_mapped_buffer_resize_copies_to_heap() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bytes.bin");
    std::fs::write(&path, [9u8, 8, 7, 6]).unwrap();

    let mut buf = Buffer::map_file(&path, None).unwrap();
    assert_eq!(buf.kind(), BufferKind::Mapped);
    assert!(buf.resize(2).is_err());

    buf.safe_resize(6).unwrap();
    assert_eq!(buf.kind(), BufferKind::Heap);
    assert_eq!(buf.as_bytes(), &[9, 8, 7, 6, 0, 0]);
    buf.as_bytes_mut().unwrap()[0] = 1;
    assert_eq!(std::fs::read(&path).unwrap(), vec![9, 8, 7, 6]);
}

#[test]
fn test_deep_copy_is_independent() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bytes.bin");
    std::fs::write(&path, b"columnar").unwrap();

    let mapped = Buffer::map_file(&path, Some(8)).unwrap();
    let mut copy = mapped.deep_copy();
    assert_eq!(copy.kind(), BufferKind::Heap);
    copy.as_bytes_mut().unwrap()[0] = b'C';
    assert_eq!(copy.as_bytes(), b"Columnar");
    assert_eq!(mapped.as_bytes(), b"columnar");
    assert!(copy.memory_footprint() >= copy.size());
}

#[test]
fn test_strided_loop_over_mapped_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bytes.bin");
    std::fs::write(&path, [0u8, 10, 20, 30, 40, 50, 60, 70]).unwrap();
    let buf = Buffer::map_file(&path, None).unwrap();
    let bytes = buf.as_bytes();

    let index = RowIndex::slice(7, -2, 4);
    index.validate(bytes.len()).unwrap();
    let mut seen = Vec::new();
    index.strided_loop(0, 4, 1, |j| seen.push(bytes[j]));
    assert_eq!(seen, vec![70, 50, 30, 10]);

    let index = RowIndex::from_indices(vec![2, 2, 0]);
    let mut seen = Vec::new();
    index.strided_loop(0, 3, 1, |j| seen.push(bytes[j]));
    assert_eq!(seen, vec![20, 20, 0]);

    assert!(RowIndex::slice(6, 1, 4).validate(bytes.len()).is_err());
}

use super::*;

use util::write_value;

#[test]
fn write_read() {
    let path = "test.img";

    let text = vec![
        30, 27, 34, 50, 91, 83, 49, 5, 6, 134, 61, 2, 6, 239, 34, 8, 15,
    ];
    let data = vec![34, 1, 231, 60, 4, 2, 255];

    let image_orig = Image::from(16, text, data);

    write_file(path, &image_orig).unwrap();

    let image_read = read_file(path).unwrap();

    assert_eq!(image_orig, image_read);

    std::fs::remove_file(path).unwrap();
}

#[test]
fn header_layout() {
    let image = Image::from(16, vec![1, 2, 3, 4], vec![9, 9]);

    let mut bytes = Vec::new();
    write(&mut bytes, &image).unwrap();

    assert_eq!(bytes.len(), image.image_size());
    assert_eq!(util::read_value(&bytes[..]), 16);
    assert_eq!(
        util::read_value(&bytes[VALUE_BYTES..]),
        (IMAGE_HDR_SIZE + 4) as VmValue
    );
    assert_eq!(util::read_value(&bytes[2 * VALUE_BYTES..]), 2);
    assert_eq!(
        util::read_value(&bytes[3 * VALUE_BYTES..]),
        (IMAGE_HDR_SIZE + 4 + 2) as VmValue
    );
    assert_eq!(&bytes[IMAGE_HDR_SIZE..IMAGE_HDR_SIZE + 4], &[1, 2, 3, 4]);
    assert_eq!(&bytes[IMAGE_HDR_SIZE + 4..], &[9, 9]);
}

#[test]
fn inconsistent_image_size_is_rejected() {
    let image = Image::from(16, vec![0; 8], vec![0; 4]);
    let mut bytes = Vec::new();
    write(&mut bytes, &image).unwrap();

    // corrupt the imageSize field
    write_value(&mut bytes[3 * VALUE_BYTES..], 9999);

    match read(&mut &bytes[..]) {
        Err(Error::BadHeader(_)) => {}
        other => panic!("expected BadHeader, got {:?}", other),
    }
}

#[test]
fn data_offset_inside_header_is_rejected() {
    let image = Image::from(16, vec![0; 8], vec![0; 4]);
    let mut bytes = Vec::new();
    write(&mut bytes, &image).unwrap();

    write_value(&mut bytes[VALUE_BYTES..], 2);

    match read(&mut &bytes[..]) {
        Err(Error::BadHeader(_)) => {}
        other => panic!("expected BadHeader, got {:?}", other),
    }
}

#[test]
fn truncated_image_is_rejected() {
    let image = Image::from(16, vec![0; 8], vec![0; 4]);
    let mut bytes = Vec::new();
    write(&mut bytes, &image).unwrap();
    bytes.truncate(bytes.len() - 2);

    match read(&mut &bytes[..]) {
        Err(Error::Io(_)) => {}
        other => panic!("expected Io, got {:?}", other),
    }
}

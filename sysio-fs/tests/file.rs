use sysio_fs::{File, OpenOptions, SeekFrom};

#[test]
fn write_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt");

    let file = File::create(&path).unwrap();
    assert_eq!(file.write(b"hello world").unwrap(), 11);
    file.sync_all().unwrap();
    drop(file);

    let file = File::open(&path).unwrap();
    let mut buf = [0u8; 32];
    let n = file.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello world");
    // Past the end there is nothing left.
    assert_eq!(file.read(&mut buf).unwrap(), 0);
}

#[test]
fn seek_moves_the_read_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt");

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&path)
        .unwrap();
    file.write(b"0123456789").unwrap();
    assert_eq!(file.seek(SeekFrom::Start(4)).unwrap(), 4);

    let mut buf = [0u8; 4];
    let n = file.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"4567");
}

#[test]
fn create_new_refuses_an_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("once.txt");

    File::create(&path).unwrap();
    let err = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
}

#[test]
fn truncating_without_write_access_is_rejected() {
    let err = OpenOptions::new()
        .read(true)
        .truncate(true)
        .open("whatever")
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

/*!

This is the long-form manual for `resource_accounting` and `pledgerec`.

## Extracts

`pledgerec` reads one directory per year, and one sub-directory per month
for the usage reports:

```text
<data root>/NamingDictionary.csv
<data root>/2017/MandO.csv
<data root>/2017/pledges.csv
<data root>/2017/Requirements.csv
<data root>/2017/1/TIER1_TIER1_sum_normcpu_TIER1_VO.csv
<data root>/2017/1/reptier2.csv
<data root>/2017/1/CPU_Usage.csv
<data root>/2017/1/Disk_Tape_Usage.csv
```

All the names can be changed in the [configuration](#configuration). A file
ending in `.xlsx` is read from its first worksheet.

### Membership roster

One line per person. The only column read is `Funding Agency`, which holds
the status and the agency name:

```text
Name,Institute,Funding Agency
Doe,INFN Bari,MS-Italy-INFN
Roe,UNAM,NMS-Mexico
```

`MS-` marks a member state, `NMS-` a non-member state. The number of lines
of an agency is its number of M&O payers. The free text columns left of
`Funding Agency` may contain unescaped commas.

### Pledges

The pledge sheet lists every site of every experiment. A site occupies
consecutive lines: CPU, disk, and tape for Tier-0 and Tier-1 sites only.

```text
Tier,Pledge Type,Site,Name,Unit,ALICE,ATLAS
Tier 1,France,FR-CCIN2P3,Lyon,HEP-SPEC06,60000,90000
Tier 1,France,FR-CCIN2P3,Lyon,Tbytes,5000,9000
Tier 1,France,FR-CCIN2P3,Lyon,Tbytes,6000,8000
Tier 2,France,FR-GRIF,Paris,HEP-SPEC06,10000,0
Tier 2,France,FR-GRIF,Paris,Tbytes,900,0
```

- Only the sites with a non-zero `ALICE` CPU pledge are read.
- The `Name` column is free text and may contain commas. The columns on its
  right are located from the end of the row.
- The unit column must read `HEP-SPEC06` on CPU lines and `Tbytes` on
  storage lines. Anything else stops the processing.
- The second column is matched against the agency names. A few country
  spellings are translated (`Switzerland` is `CERN`, `UK` is
  `UnitedKingdom-STFC`, `Russian Federation` is `Russia`, `Latin America` is
  `Brazil`).

Agencies without any pledge get one Tier-2 placeholder site per monitoring
compute element listed in the naming dictionary, so that their monitoring
usage is still accounted.

### Requirements

Semicolon separated, in kHEPSPEC06 and PB:

```text
;CPU;Disk;Tape
T0;400;40;60
T1;300;30;50
T2;350;35;0
Total smooth;1050;105;110
```

The host lab owes the Tier-0 requirement. The Tier-1 and Tier-2
requirements are shared between the other agencies in proportion to their
payers. Tape is shared between the agencies operating a Tier-1 only.

### Accounting reports

Both monthly accounting reports start with four lines of preamble followed
by a header. The value column is the first one whose header contains
`alice`, in HEPSPEC06 hours.

- Tier-0/1 report: the first column is the site name. Every site must
  be a pledged site. The report ends at the `Total` line.
- Tier-2 report: the first column is the country, the second one the
  accounting federation. The report ends at the first federation containing
  `Total`. A federation that does not match any site name of the country is
  bound for good to the first Tier-2 site of the country that has no
  accounting name yet.

### Monitoring series

`Time` then one column per element, one line per sample.

- CPU: one column per compute element. The monthly value is
  `sum * 4.2 / hours / samples / 10000` kHEPSPEC06.
- Storage: one column per storage element, in GB. The monthly value is the
  mean over the samples. Elements whose name contains `TAPE`, `T0ALICE` or
  `CASTOR2` are tape.

### Naming dictionary

Semicolon separated, one line per element:

```text
FA;SE;CE ML;CE WLCG
France;ALICE::CCIN2P3::SE;CCIN2P3;FR-CCIN2P3
```

The columns are the agency (as in the roster, or a cluster name), the
storage element, the monitoring compute element and the federation name of
the pledge sheet. Empty cells are allowed.

## Clusters

Some agencies are reported under a common name (for example `France` for
`France-CEA` and `France-IN2P3/CNRS`). The cluster takes over the payers and
the sites of its agencies, which are then hidden from the listings.

## Configuration

All the keys are optional.

```json
{
  "dataRoot": "data",
  "namingDictionary": "NamingDictionary.csv",
  "templates": {
    "membership": "{year}/MandO.csv",
    "tier2Usage": "{year}/{month}/reptier2.csv"
  },
  "delimiters": {
    "requirements": ";"
  },
  "clusters": [
    { "name": "Nordic", "status": "MS", "members": ["Denmark", "Finland", "Norway"] }
  ],
  "outputPath": "stdout",
  "format": "csv"
}
```

`{month}` is the month number (`1` to `12`) and `{mm}` the two-digit month.
Defining `clusters` replaces the default
groupings.

 */

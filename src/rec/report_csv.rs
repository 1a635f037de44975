// The reconciliation table in the historical CSV layout: every cell is
// followed by ", ", one line per member, and a totals line.

use resource_accounting::report::{MemberRow, MemberUsage, TotalsRow, UsageColumns};

use crate::rec::*;

const HEADERS: [&str; 13] = [
    "Status",
    "Funding Agency",
    "M&O Payers",
    "Contribution(%)",
    "Required CPU (kHEPSPEC06)",
    "Required Disk (PB)",
    "Required Tape (PB)",
    "Pledged CPU (kHEPSPEC06)",
    "Pledged Disk (PB)",
    "Pledged Tape (PB)",
    "Diff CPU (%)",
    "Diff Disk (%)",
    "Diff Tape (%)",
];

fn usage_headers(month: Month) -> Vec<String> {
    let name = month.name();
    vec![
        format!("{} Used CPU (kHEPSPEC06)", name),
        format!("{} ML Used CPU (kHEPSPEC06)", name),
        format!("{} ML Used Disk (PB)", name),
        format!("{} ML Used Tape (PB)", name),
    ]
}

fn usage_cells(u: &MemberUsage) -> Vec<String> {
    [
        u.accounting_cpu,
        u.monitoring_cpu,
        u.monitoring_disk,
        u.monitoring_tape,
    ]
    .iter()
    .map(|v| format!("{:5.2}", v))
    .collect()
}

fn quantity_cells(q: &ResourceQuantity) -> Vec<String> {
    ResourceType::ALL
        .iter()
        .map(|rt| format!("{:5.2}", q.get(*rt)))
        .collect()
}

fn member_cells(row: &MemberRow) -> Vec<String> {
    let mut cells = vec![
        row.status.clone(),
        row.name.clone(),
        row.payers.to_string(),
        match row.contribution_pct {
            Some(pct) => format!("{:4.2}", pct),
            None => "-".to_string(),
        },
    ];
    cells.extend(quantity_cells(&row.required));
    cells.extend(quantity_cells(&row.pledged));
    cells.extend(
        ResourceType::ALL
            .iter()
            .map(|rt| format!("{:5.0}", row.variance.get(*rt))),
    );
    cells
}

fn totals_cells(totals: &TotalsRow) -> Vec<String> {
    let mut cells = vec![
        String::new(),
        "Total".to_string(),
        totals.payers.to_string(),
        String::new(),
    ];
    cells.extend(quantity_cells(&totals.required));
    cells.extend(quantity_cells(&totals.pledged));
    cells.extend(
        ResourceType::ALL
            .iter()
            .map(|rt| format!("{:5.2}", totals.variance.get(*rt))),
    );
    cells
}

fn push_line(out: &mut String, cells: &[String]) {
    for c in cells {
        out.push_str(c);
        out.push_str(", ");
    }
    out.push('\n');
}

pub fn render(collab: &Collaboration, usage: Option<&UsageColumns>) -> String {
    let mut out = String::new();

    let mut header: Vec<String> = HEADERS.iter().map(|s| s.to_string()).collect();
    if let Some(u) = usage {
        header.extend(usage_headers(u.month));
    }
    push_line(&mut out, &header);

    for (idx, row) in collab.list_members().iter().enumerate() {
        let mut cells = member_cells(row);
        if let Some(u) = usage {
            cells.extend(usage_cells(&u.rows[idx]));
        }
        push_line(&mut out, &cells);
    }

    let mut cells = totals_cells(&collab.totals());
    if let Some(u) = usage {
        cells.extend(usage_cells(&u.total));
    }
    push_line(&mut out, &cells);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> MemberRow {
        MemberRow {
            name: "Italy".to_string(),
            status: "MS".to_string(),
            payers: 12,
            contribution_pct: Some(8.5),
            required: ResourceQuantity::new(40.0, 4.0, 3.25),
            pledged: ResourceQuantity::new(30.0, 4.0, 0.0),
            variance: report::Variance::between(
                ResourceQuantity::new(30.0, 4.0, 0.0),
                ResourceQuantity::new(40.0, 4.0, 3.25),
            ),
        }
    }

    #[test]
    fn member_line() {
        let mut out = String::new();
        push_line(&mut out, &member_cells(&row()));
        assert_eq!(
            out,
            "MS, Italy, 12, 8.50, 40.00,  4.00,  3.25, 30.00,  4.00,  0.00,   -25,     0,  -100, \n"
        );
    }

    #[test]
    fn host_lab_and_totals_lines() {
        let mut r = row();
        r.contribution_pct = None;
        assert_eq!(member_cells(&r)[3], "-");
        let totals = TotalsRow {
            payers: 100,
            required: ResourceQuantity::new(10.0, 1.0, 1.0),
            pledged: ResourceQuantity::new(9.0, 1.0, 1.0),
            variance: report::Variance::between(
                ResourceQuantity::new(9.0, 1.0, 1.0),
                ResourceQuantity::new(10.0, 1.0, 1.0),
            ),
        };
        let mut out = String::new();
        push_line(&mut out, &totals_cells(&totals));
        assert_eq!(
            out,
            ", Total, 100, , 10.00,  1.00,  1.00,  9.00,  1.00,  1.00, -10.00,  0.00,  0.00, \n"
        );
    }

    #[test]
    fn usage_columns_are_appended() {
        let jan = Month::new(2017, 1).unwrap();
        let h = usage_headers(jan);
        assert_eq!(h[0], "January Used CPU (kHEPSPEC06)");
        assert_eq!(h[3], "January ML Used Tape (PB)");
        let u = MemberUsage {
            accounting_cpu: 1.0,
            monitoring_cpu: 2.0,
            monitoring_disk: 0.5,
            monitoring_tape: 0.0,
        };
        assert_eq!(usage_cells(&u), vec![" 1.00", " 2.00", " 0.50", " 0.00"]);
    }
}
